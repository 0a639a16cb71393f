use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Subdirectory of the output directory holding decompiled Java.
pub const SOURCES_DIR: &str = "sources";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompileStatus {
    /// The process finished within the deadline, whatever its exit code.
    Ok,
    Timeout,
    /// The process could not be started or waited on.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decompilation {
    pub status: DecompileStatus,
    /// Wall-clock seconds, rounded to centiseconds.
    pub duration_sec: f64,
    pub exit_code: Option<i32>,
}

impl Decompilation {
    pub fn new(status: DecompileStatus, elapsed: Duration, exit_code: Option<i32>) -> Self {
        Self {
            status,
            duration_sec: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
            exit_code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == DecompileStatus::Ok
    }
}

/// Something that turns an APK into Java sources under
/// `<out_dir>/sources`.
pub trait Decompile {
    /// Clears and recreates `out_dir`, then decompiles `apk` into it.
    fn decompile(&self, apk: &Path, out_dir: &Path) -> Decompilation;
}

/// The external `jadx` command line decompiler.
#[derive(Debug, Clone)]
pub struct Jadx {
    pub binary: PathBuf,
    pub timeout: Duration,
    /// Passed as `--threads-count` when set.
    pub threads: Option<usize>,
}

impl Default for Jadx {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("jadx"),
            timeout: DEFAULT_TIMEOUT,
            threads: None,
        }
    }
}

impl Jadx {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            threads: None,
        }
    }

    fn command(&self, apk: &Path, out_dir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(threads) = self.threads {
            command.arg("--threads-count").arg(threads.to_string());
        }
        command
            .arg("--no-res")
            .arg("--no-debug-info")
            .arg("-d")
            .arg(out_dir)
            .arg(apk)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

/// Removes `dir` if present and creates it empty.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => (),
        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

enum Waited {
    Exited(ExitStatus),
    TimedOut,
}

fn wait_deadline(child: &mut Child, timeout: Duration) -> io::Result<Waited> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Waited::TimedOut);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

impl Decompile for Jadx {
    fn decompile(&self, apk: &Path, out_dir: &Path) -> Decompilation {
        let start = Instant::now();
        if let Err(e) = reset_dir(out_dir) {
            warn!("Cannot prepare {}: {e}", out_dir.display());
            return Decompilation::new(DecompileStatus::Error, start.elapsed(), None);
        }

        let mut child = match self.command(apk, out_dir).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Cannot run {}: {e}", self.binary.display());
                return Decompilation::new(DecompileStatus::Error, start.elapsed(), None);
            }
        };

        match wait_deadline(&mut child, self.timeout) {
            Ok(Waited::Exited(status)) => {
                if !status.success() {
                    debug!("{} exited with {status}", self.binary.display());
                }
                Decompilation::new(DecompileStatus::Ok, start.elapsed(), status.code())
            }
            Ok(Waited::TimedOut) => {
                warn!(
                    "{} timed out after {}s on {}",
                    self.binary.display(),
                    self.timeout.as_secs(),
                    apk.display()
                );
                if let Err(e) = child.kill() {
                    debug!("kill: {e}");
                }
                let _ = child.wait();
                Decompilation::new(DecompileStatus::Timeout, start.elapsed(), None)
            }
            Err(e) => {
                warn!("Waiting on {} failed: {e}", self.binary.display());
                let _ = child.kill();
                let _ = child.wait();
                Decompilation::new(DecompileStatus::Error, start.elapsed(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{reset_dir, Decompilation, DecompileStatus};

    #[test]
    fn test_duration_rounding() {
        let d = Decompilation::new(DecompileStatus::Ok, Duration::from_millis(1234), Some(0));
        assert_eq!(d.duration_sec, 1.23);
        let d = Decompilation::new(DecompileStatus::Ok, Duration::from_millis(1236), Some(0));
        assert_eq!(d.duration_sec, 1.24);
    }

    #[test]
    fn test_reset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(scratch.join("sources/com")).unwrap();
        std::fs::write(scratch.join("sources/com/A.java"), "class A {}").unwrap();
        reset_dir(&scratch).unwrap();
        assert!(scratch.is_dir());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);

        let fresh = dir.path().join("fresh/nested");
        reset_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }

    #[test]
    fn test_missing_binary() {
        use super::{Decompile, Jadx};

        let dir = tempfile::tempdir().unwrap();
        let jadx = Jadx::new(dir.path().join("no-such-jadx"), Duration::from_secs(5));
        let outcome = jadx.decompile(&dir.path().join("a.apk"), &dir.path().join("out"));
        assert_eq!(outcome.status, DecompileStatus::Error);
        assert_eq!(outcome.exit_code, None);
    }

    #[cfg(unix)]
    mod unix {
        use std::{fs, os::unix::fs::PermissionsExt, path::Path, time::Duration};

        use crate::decompiler::{Decompile, DecompileStatus, Jadx, SOURCES_DIR};

        fn script(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("fake-jadx");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_ok_writes_sources() {
            let dir = tempfile::tempdir().unwrap();
            // args: --no-res --no-debug-info -d <out> <apk>
            let bin = script(
                dir.path(),
                "mkdir -p \"$4/sources/com\" && echo 'class A {}' > \"$4/sources/com/A.java\"",
            );
            let out = dir.path().join("scratch");
            let outcome = Jadx::new(bin, Duration::from_secs(10)).decompile(Path::new("x.apk"), &out);
            assert_eq!(outcome.status, DecompileStatus::Ok);
            assert_eq!(outcome.exit_code, Some(0));
            assert!(out.join(SOURCES_DIR).join("com/A.java").is_file());
        }

        #[test]
        fn test_nonzero_exit_is_still_ok() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exit 3");
            let outcome = Jadx::new(bin, Duration::from_secs(10))
                .decompile(Path::new("x.apk"), &dir.path().join("scratch"));
            assert_eq!(outcome.status, DecompileStatus::Ok);
            assert_eq!(outcome.exit_code, Some(3));
        }

        #[test]
        fn test_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exec sleep 30");
            let outcome = Jadx::new(bin, Duration::from_millis(300))
                .decompile(Path::new("x.apk"), &dir.path().join("scratch"));
            assert_eq!(outcome.status, DecompileStatus::Timeout);
            assert!(outcome.duration_sec < 10.0);
        }

        #[test]
        fn test_thread_flag() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("args.txt");
            let bin = script(dir.path(), &format!("echo \"$@\" > '{}'", log.display()));
            let mut jadx = Jadx::new(bin, Duration::from_secs(10));
            jadx.threads = Some(1);
            jadx.decompile(Path::new("x.apk"), &dir.path().join("scratch"));
            let args = fs::read_to_string(&log).unwrap();
            assert!(args.starts_with("--threads-count 1 --no-res --no-debug-info -d "));
            assert!(args.trim_end().ends_with("x.apk"));
        }
    }
}
