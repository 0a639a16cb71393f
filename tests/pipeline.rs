use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::Path,
    time::Duration,
};

use apkscan::{
    decompiler::{reset_dir, SOURCES_DIR},
    record::{AnalysisState, RecordDir, RAW_FEATURES_FILE, SUMMARY_FILE},
    Decompilation, Decompile, DecompileStatus, Outcome, Pipeline, PipelineConfig,
};
use zip::{write::SimpleFileOptions, ZipWriter};

/// Stands in for jadx: writes canned sources for each APK by file name.
#[derive(Default)]
struct FakeJadx {
    sources: BTreeMap<String, Vec<(&'static str, &'static str)>>,
    status: BTreeMap<String, DecompileStatus>,
    calls: RefCell<Vec<String>>,
}

impl FakeJadx {
    fn with_sources(mut self, apk: &str, files: &[(&'static str, &'static str)]) -> Self {
        self.sources.insert(apk.to_string(), files.to_vec());
        self
    }

    fn with_status(mut self, apk: &str, status: DecompileStatus) -> Self {
        self.status.insert(apk.to_string(), status);
        self
    }
}

impl Decompile for FakeJadx {
    fn decompile(&self, apk: &Path, out_dir: &Path) -> Decompilation {
        let name = apk.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.borrow_mut().push(name.clone());
        reset_dir(out_dir).unwrap();
        for (rel, text) in self.sources.get(&name).into_iter().flatten() {
            let path = out_dir.join(SOURCES_DIR).join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let status = self.status.get(&name).copied().unwrap_or(DecompileStatus::Ok);
        Decompilation::new(status, Duration::from_millis(120), Some(0))
    }
}

fn write_apk(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

fn basic_apk(path: &Path) {
    write_apk(
        path,
        &[
            ("AndroidManifest.xml", b"\x03\x00\x08"),
            ("classes.dex", b"dex\n035\0"),
            ("classes2.dex", b"dex\n035\0"),
            ("lib/arm64-v8a/libnative.so", b"\x7fELF"),
        ],
    );
}

const TRACKER_MANIFEST: &[u8] = include_bytes!("fixtures/AndroidManifest.xml");

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("apks");
        fs::create_dir_all(&input).unwrap();
        let config = PipelineConfig::new(&input, dir.path().join("output"));
        Self { _dir: dir, config }
    }

    fn input(&self) -> &Path {
        &self.config.input_dir
    }

    fn records(&self, name: &str) -> RecordDir {
        RecordDir::new(&self.config.output_dir, name)
    }
}

#[test]
fn test_processes_in_sorted_order() {
    let fx = Fixture::new();
    for name in ["b.apk", "a.apk", "c.apk"] {
        basic_apk(&fx.input().join(name));
    }
    let jadx = FakeJadx::default();
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    let report = pipeline.run().unwrap();

    let names: Vec<_> = report.artifacts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(report.count(Outcome::Complete), 3);
}

#[test]
fn test_second_run_skips_everything() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("one.apk"));
    fs::write(fx.input().join("two.apk"), "plain text").unwrap();

    let jadx = FakeJadx::default().with_sources(
        "one.apk",
        &[("com/x/A.java", "class A { void f() { lm.getCurrentLocation(p, s, e, cb); } }")],
    );
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    pipeline.run().unwrap();

    let snapshot = |name: &str| {
        let records = fx.records(name);
        (
            fs::read(records.summary_path()).ok(),
            fs::read(records.raw_features_path()).ok(),
        )
    };
    let before = (snapshot("one"), snapshot("two"));

    let report = pipeline.run().unwrap();
    assert_eq!(report.count(Outcome::Skipped), 2);
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!((snapshot("one"), snapshot("two")), before);
}

#[test]
fn test_skip_ignores_changed_artifact() {
    let fx = Fixture::new();
    let apk = fx.input().join("app.apk");
    basic_apk(&apk);
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), FakeJadx::default());
    pipeline.run().unwrap();
    let summary = fx.records("app").read_summary().unwrap();

    write_apk(&apk, &[("classes.dex", b"changed")]);
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), FakeJadx::default());
    let report = pipeline.run().unwrap();
    assert_eq!(report.artifacts, vec![("app".to_string(), Outcome::Skipped)]);
    assert_eq!(fx.records("app").read_summary().unwrap(), summary);
}

#[test]
fn test_invalid_archive() {
    let fx = Fixture::new();
    fs::write(fx.input().join("readme.apk"), "this is a text file").unwrap();
    let jadx = FakeJadx::default();
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    let report = pipeline.run().unwrap();
    assert_eq!(report.artifacts, vec![("readme".to_string(), Outcome::Invalid)]);

    let records = fx.records("readme");
    let summary = read_json(&records.summary_path());
    assert_eq!(summary["analysis_state"], "invalid_apk");
    assert_eq!(summary["error"], "File is not a valid ZIP/APK");
    assert_eq!(summary["sha256"].as_str().map(str::len), Some(64));
    assert!(!records.raw_features_path().exists());
}

#[test]
fn test_partial_metadata_still_complete() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("broken.apk"));
    let jadx = FakeJadx::default().with_sources(
        "broken.apk",
        &[("a/Main.java", "class Main { void f() { System.loadLibrary(\"x\"); } }")],
    );
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    pipeline.run().unwrap();

    let records = fx.records("broken");
    let summary = read_json(&records.summary_path());
    assert!(summary["metadata"]["error"].is_string());
    assert_eq!(summary["analysis_state"], "complete");
    assert_eq!(summary["stats"]["dex_count"], 2);
    assert_eq!(summary["stats"]["native_lib_count"], 1);
    assert_eq!(summary["ast_analysis"]["jni"], 1);

    let raw = read_json(&records.raw_features_path());
    assert_eq!(raw["exported_components"]["activities"], serde_json::json!([]));
    assert_eq!(raw["native_libs"], serde_json::json!(["lib/arm64-v8a/libnative.so"]));
    assert_eq!(raw["dex_files_count"], 2);
}

#[test]
fn test_timeout_yields_partial() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("slow.apk"));
    // sources are present but must not be scanned
    let jadx = FakeJadx::default()
        .with_sources(
            "slow.apk",
            &[("a/Cam.java", "class Cam { void f() { m.openCamera(id, cb, h); } }")],
        )
        .with_status("slow.apk", DecompileStatus::Timeout);
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    let report = pipeline.run().unwrap();
    assert_eq!(report.artifacts, vec![("slow".to_string(), Outcome::Partial)]);

    let summary = fx.records("slow").read_summary().unwrap();
    assert_eq!(summary.analysis_state, AnalysisState::Partial);
    let jadx = summary.jadx.unwrap();
    assert_eq!(jadx.status, DecompileStatus::Timeout);
    assert!(!jadx.sources_present);
    let counts = summary.ast_analysis.unwrap();
    assert_eq!(counts.len(), 6);
    assert!(counts.values().all(|&c| c == 0));
}

#[test]
fn test_taxonomy_matching() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("spy.apk"));
    let jadx = FakeJadx::default().with_sources(
        "spy.apk",
        &[
            ("com/spy/Loc.java", "class Loc { void f() { lm.requestLocationUpdates(p, 0L, 0f, l); } }"),
            ("com/spy/Mic.java", "class Mic { void f() { r.startRecording(); r.startRecording(); } }"),
            ("com/spy/Other.java", "class Other { void f() { x.notInTaxonomy(); } }"),
        ],
    );
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), jadx);
    pipeline.run().unwrap();

    let records = fx.records("spy");
    let summary = records.read_summary().unwrap();
    let counts = summary.ast_analysis.unwrap();
    assert_eq!(counts["location"], 1);
    assert_eq!(counts["microphone"], 2);
    assert_eq!(counts.values().sum::<u64>(), 3);
    let jadx = summary.jadx.unwrap();
    assert!(jadx.sources_present);
    assert_eq!(jadx.java_file_count, 3);

    let raw = records.read_raw_features().unwrap();
    assert_eq!(
        raw.java_files,
        vec!["com/spy/Loc.java", "com/spy/Mic.java", "com/spy/Other.java"]
    );
    assert_eq!(raw.ast_hits_by_file["location"], vec!["com/spy/Loc.java"]);
    assert_eq!(
        raw.ast_hits_by_file["microphone"],
        vec!["com/spy/Mic.java", "com/spy/Mic.java"]
    );
    assert!(raw.ast_hits_by_file["camera"].is_empty());

    // scratch space is gone once the artifact is done
    assert!(!fx.config.scratch_dir.exists());
}

#[test]
fn test_failure_is_isolated() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("a.apk"));
    basic_apk(&fx.input().join("b.apk"));
    // a file where the output directory of `a` should go
    fs::create_dir_all(&fx.config.output_dir).unwrap();
    fs::write(fx.config.output_dir.join("a"), "in the way").unwrap();

    let pipeline = Pipeline::with_decompiler(fx.config.clone(), FakeJadx::default());
    let report = pipeline.run().unwrap();
    assert_eq!(
        report.artifacts,
        vec![
            ("a".to_string(), Outcome::Failed),
            ("b".to_string(), Outcome::Complete)
        ]
    );
    assert!(report.has_failures());
    assert!(fx.records("b").has_summary());
}

#[test]
fn test_output_layout() {
    let fx = Fixture::new();
    basic_apk(&fx.input().join("layout.apk"));
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), FakeJadx::default());
    pipeline.run().unwrap();

    let dir = fx.config.output_dir.join("layout");
    assert!(dir.join(SUMMARY_FILE).is_file());
    assert!(dir.join(RAW_FEATURES_FILE).is_file());

    let summary = read_json(&dir.join(SUMMARY_FILE));
    let keys: Vec<_> = summary.as_object().unwrap().keys().cloned().collect();
    for key in ["apk_name", "sha256", "metadata", "stats", "jadx", "ast_analysis", "analysis_state"] {
        assert!(keys.iter().any(|k| k == key), "missing {key}");
    }
    assert_eq!(summary["jadx"]["duration_sec"], 0.12);
}

#[test]
fn test_manifest_metadata_and_components() {
    let fx = Fixture::new();
    write_apk(
        &fx.input().join("tracker.apk"),
        &[
            ("AndroidManifest.xml", TRACKER_MANIFEST),
            ("classes.dex", b"dex\n035\0"),
        ],
    );
    let pipeline = Pipeline::with_decompiler(fx.config.clone(), FakeJadx::default());
    let report = pipeline.run().unwrap();
    assert_eq!(report.artifacts, vec![("tracker".to_string(), Outcome::Complete)]);

    let records = fx.records("tracker");
    let summary = read_json(&records.summary_path());
    let metadata = &summary["metadata"];
    assert_eq!(metadata["package_name"], "com.example.tracker");
    assert_eq!(metadata["version_code"], 7);
    assert_eq!(metadata["min_sdk"], 21);
    assert_eq!(metadata["target_sdk"], 33);
    assert!(metadata.get("error").is_none());
    assert!(metadata.get("permission_details").is_none());

    let raw = records.read_raw_features().unwrap();
    assert_eq!(
        raw.exported_components.activities,
        vec![
            "com.example.tracker.MainActivity",
            "com.example.tracker.SettingsActivity"
        ]
    );
    assert_eq!(
        raw.exported_components.services,
        vec!["com.example.tracker.LocationService"]
    );
    assert_eq!(
        raw.exported_components.receivers,
        vec!["com.example.tracker.BootReceiver"]
    );
}
