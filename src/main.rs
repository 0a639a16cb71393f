use std::{path::PathBuf, process::ExitCode, time::Duration};

use apkscan::{
    enrich::enrich_all, permissions::PermissionCatalog, Jadx, Pipeline, PipelineConfig,
    ScanMode, Taxonomy,
};
use clap::{Parser, Subcommand};
use log::{error, LevelFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze every APK in a directory
    Analyze {
        /// Directory containing the APKs
        #[arg(short, long)]
        input: PathBuf,

        /// Output root, one subdirectory per APK
        #[arg(short, long)]
        output: PathBuf,

        /// Path to the jadx binary
        #[arg(long, default_value = "jadx")]
        jadx: PathBuf,

        /// Scratch directory for decompiled sources [default: <output>/.jadx-scratch]
        #[arg(long)]
        scratch: Option<PathBuf>,

        /// Decompilation timeout in seconds
        #[arg(short, long, default_value_t = 600)]
        timeout: u64,

        /// Number of jadx worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// JSON taxonomy, category to method names
        #[arg(long)]
        taxonomy: Option<PathBuf>,

        /// How decompiled sources are matched
        #[arg(short, long, value_enum, default_value_t = ScanMode::Ast)]
        mode: ScanMode,
    },
    /// Add permission protection levels to existing summaries
    Enrich {
        /// Directory containing the APKs
        #[arg(short, long)]
        input: PathBuf,

        /// Output root of a previous analyze run
        #[arg(short, long)]
        output: PathBuf,

        /// JSON permission catalog [default: built-in table]
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Print the built-in taxonomy as JSON
    Taxonomy {
        #[arg(short, long, value_enum, default_value_t = ScanMode::Ast)]
        mode: ScanMode,
    },
}

fn init_logger(args: &Args) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    } else if args.quiet {
        builder.filter_level(LevelFilter::Warn);
    }
    builder.init();
}

fn run(command: Command) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Command::Analyze {
            input,
            output,
            jadx,
            scratch,
            timeout,
            threads,
            taxonomy,
            mode,
        } => {
            let mut jadx = Jadx::new(jadx, Duration::from_secs(timeout));
            jadx.threads = threads;
            let mut config = PipelineConfig::new(input, output)
                .with_scan_mode(mode)
                .with_jadx(jadx);
            if let Some(path) = taxonomy {
                config = config.with_taxonomy(Taxonomy::load(&path)?);
            }
            if let Some(scratch) = scratch {
                config = config.with_scratch_dir(scratch);
            }
            let report = Pipeline::new(config).run()?;
            Ok(!report.has_failures())
        }
        Command::Enrich {
            input,
            output,
            catalog,
        } => {
            let catalog = match catalog {
                Some(path) => PermissionCatalog::load(&path)?,
                None => PermissionCatalog::builtin(),
            };
            enrich_all(&input, &output, apkscan::config::DEFAULT_SUFFIX, &catalog)?;
            Ok(true)
        }
        Command::Taxonomy { mode } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&Taxonomy::default_for(mode))?
            );
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(&args);

    match run(args.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
