#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use tiebreak_guard::tiebreak::candidate::RankedCandidate;

pub const FROZEN_V1: &str = r#"{
    "schema_version": "v1",
    "frozen": true,
    "frozen_at": "2026-01-15T00:00:00Z",
    "thresholds": {
        "collapse_detection": {
            "HEALTHY": {"entropy_min": 0.4, "gini_max": 0.6, "exclusive_gini_max": true},
            "COLLAPSED_UNIFORM": {"entropy_max": 0.2, "exclusive_entropy_max": true, "gini_max": 0.4, "exclusive_gini_max": true},
            "COLLAPSED_DELTA": {"entropy_min": 0.8, "gini_min": 0.8}
        }
    }
}"#;

pub const CANARY_ALL: &str = r#"{"canary_percent": 100, "kill_switch": false, "routing_seed": "s1"}"#;

/// Env vars that would leak the host's configuration into a test run.
const SCRUBBED_ENV: &[&str] = &[
    "GTB_MODE",
    "GTB_THRESHOLDS_FILE",
    "GTB_CANARY_CONFIG_FILE",
    "GTB_TOP_K",
    "GTB_GAP_PERCENTILE",
    "GTB_TELEMETRY_ENABLED",
    "GTB_TELEMETRY_JSONL",
    "GTB_CANARY_PERCENT",
    "GTB_CANARY_KILL_SWITCH",
    "GTB_CANARY_ROUTING_SEED",
    "GTB_OUTPUT_FORMAT",
];

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// A temp directory holding a settings file and both artifacts.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new(thresholds: Option<&str>, canary: Option<&str>, mode: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        let fixture = Self { dir };
        if let Some(raw) = thresholds {
            fs::write(fixture.thresholds_path(), raw).expect("write thresholds");
        }
        if let Some(raw) = canary {
            fs::write(fixture.canary_path(), raw).expect("write canary");
        }
        let settings = format!(
            "mode = \"{mode}\"\n\n[artifacts]\nthresholds_file = {:?}\ncanary_file = {:?}\n\n[telemetry]\njsonl_log = {:?}\nfallback_log = {:?}\n",
            fixture.thresholds_path(),
            fixture.canary_path(),
            fixture.telemetry_path(),
            fixture.dir.path().join("fallback.jsonl"),
        );
        fs::write(fixture.config_path(), settings).expect("write settings");
        fixture
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn thresholds_path(&self) -> PathBuf {
        self.dir.path().join("thresholds.json")
    }

    pub fn canary_path(&self) -> PathBuf {
        self.dir.path().join("canary.json")
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.dir.path().join("telemetry.jsonl")
    }

    pub fn config_arg(&self) -> String {
        self.config_path().to_string_lossy().into_owned()
    }
}

/// 10 docs, healthy spread, exactly one out-of-order near-tie pair at the top.
pub fn healthy_ranked() -> Vec<RankedCandidate> {
    [
        (10.0, 0.1, "a"),
        (10.0, 0.9, "b"),
        (9.0, 0.5, "d0"),
        (7.0, 0.5, "c1"),
        (7.0, 0.5, "c2"),
        (6.0, 0.5, "d1"),
        (4.0, 0.5, "e1"),
        (4.0, 0.5, "e2"),
        (3.0, 0.5, "d2"),
        (1.0, 0.5, "d3"),
    ]
    .into_iter()
    .map(|(p, s, id)| RankedCandidate::new(p, s, id))
    .collect()
}

pub fn doc_ids(ranked: &[RankedCandidate]) -> Vec<&str> {
    ranked.iter().map(|c| c.doc_id.as_str()).collect()
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_gtb") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "gtb.exe" } else { "gtb" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve gtb binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_stdin(case_name, args, None)
}

pub fn run_cli_case_with_stdin(case_name: &str, args: &[&str], stdin: Option<&str>) -> CmdResult {
    let root = std::env::temp_dir().join("gtb-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for name in SCRUBBED_ENV {
        command.env_remove(name);
    }
    let mut child = command.spawn().expect("spawn gtb command");
    {
        let mut pipe = child.stdin.take().expect("child stdin");
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).expect("write child stdin");
        }
    }
    let output = child.wait_with_output().expect("execute gtb command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

pub fn last_json_line(stdout: &str) -> serde_json::Value {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .expect("stdout has a line");
    serde_json::from_str(line).expect("stdout line is JSON")
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
