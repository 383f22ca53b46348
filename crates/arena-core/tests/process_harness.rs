//! End-to-end runner tests against real `/bin/sh` children.
#![cfg(unix)]

use arena_core::{EngineConfig, EngineSetup, LocalConfig, LocalMatchRunner, RunnerSettings, ServerCommand};
use arena_proto::{Error, Outcome};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Server stand-in: records its pid, announces readiness, then idles.
/// Invoked as `sh server.sh <strategy> <port>`.
const SERVER_SCRIPT: &str = r#"
echo $$ > "$(dirname "$1")/$2.pid"
echo "loading $1"
echo "Snake server on port $2"
exec sleep 30
"#;

/// Server stand-in that never becomes ready.
const SILENT_SERVER_SCRIPT: &str = "exec sleep 30\n";

/// Engine stand-in: writes a three-record trace to the `--output` path.
const ENGINE_SCRIPT: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
printf '{"turn": 1}\n{"turn": 2}\n{"winnerName": "candidate", "isDraw": false}\n' > "$out"
echo "engine finished" >&2
"#;

/// Engine stand-in that touches a marker file and hangs.
const HANGING_ENGINE_SCRIPT: &str = r#"
touch "$(dirname "$0")/engine.started"
exec sleep 30
"#;

struct Harness {
    scripts: TempDir,
    work_root: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            scripts: TempDir::new().unwrap(),
            work_root: TempDir::new().unwrap(),
        }
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.scripts.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn local(&self, server_script: &Path) -> LocalConfig {
        LocalConfig {
            server: ServerCommand {
                program: "sh".to_string(),
                args: vec![server_script.display().to_string()],
            },
            ..LocalConfig::default()
        }
    }

    fn engine(&self, engine_script: &Path) -> EngineSetup {
        EngineSetup {
            config: EngineConfig {
                program: "sh".to_string(),
                args: vec![engine_script.display().to_string()],
                ..EngineConfig::default()
            },
            ..EngineSetup::default()
        }
    }

    fn runner(&self, ready_timeout: Duration, match_timeout: Duration) -> LocalMatchRunner {
        LocalMatchRunner::system(RunnerSettings {
            ready_timeout,
            match_timeout,
            work_root: Some(self.work_root.path().to_path_buf()),
            ..RunnerSettings::default()
        })
    }

    fn strategy(&self, name: &str) -> PathBuf {
        let path = self.scripts.path().join(name);
        std::fs::write(&path, "def decide_move(data):\n    return 'up'\n").unwrap();
        path
    }

    fn assert_work_root_empty(&self) {
        let leftovers: Vec<_> = std::fs::read_dir(self.work_root.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch directories left behind: {leftovers:?}");
    }
}

/// True once `pid` no longer runs (gone or a zombie awaiting reaping).
#[cfg(target_os = "linux")]
async fn process_stopped(pid: &str) -> bool {
    for _ in 0..40 {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => return true,
            Ok(stat) => {
                let state = stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().next());
                if state == Some("Z") {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn full_match_with_real_processes() {
    let harness = Harness::new();
    let server = harness.script("server.sh", SERVER_SCRIPT);
    let engine = harness.script("engine.sh", ENGINE_SCRIPT);
    let local = harness.local(&server);
    let candidate = local.server_spec("candidate", &harness.strategy("mine.py"), 18_401);
    let reference = local.server_spec("reference", &harness.strategy("theirs.py"), 18_402);

    let result = harness
        .runner(Duration::from_secs(5), Duration::from_secs(10))
        .run_match(&candidate, &reference, &harness.engine(&engine))
        .await
        .unwrap();

    assert_eq!(result.outcome(), Outcome::Win);
    assert_eq!(result.turn_count(), 2);
    assert_eq!(result.raw_winner_label(), "candidate");
    harness.assert_work_root_empty();
    assert_servers_stopped(&harness, &["18401", "18402"]).await;
}

#[cfg(target_os = "linux")]
async fn assert_servers_stopped(harness: &Harness, ports: &[&str]) {
    for port in ports {
        let pid = std::fs::read_to_string(harness.scripts.path().join(format!("{port}.pid")))
            .unwrap();
        assert!(
            process_stopped(pid.trim()).await,
            "server on port {port} still running"
        );
    }
}

#[cfg(not(target_os = "linux"))]
async fn assert_servers_stopped(_harness: &Harness, _ports: &[&str]) {}

#[tokio::test]
async fn silent_server_times_out_without_starting_engine() {
    let harness = Harness::new();
    let server = harness.script("silent.sh", SILENT_SERVER_SCRIPT);
    let engine = harness.script("hang.sh", HANGING_ENGINE_SCRIPT);
    let local = harness.local(&server);
    let candidate = local.server_spec("candidate", &harness.strategy("mine.py"), 18_411);
    let reference = local.server_spec("reference", &harness.strategy("theirs.py"), 18_412);

    let err = harness
        .runner(Duration::from_millis(300), Duration::from_secs(10))
        .run_match(&candidate, &reference, &harness.engine(&engine))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ProcessStartTimeout { .. }));
    assert!(!harness.scripts.path().join("engine.started").exists());
    harness.assert_work_root_empty();
}

#[tokio::test]
async fn hanging_engine_is_stopped_at_match_timeout() {
    let harness = Harness::new();
    let server = harness.script("server.sh", SERVER_SCRIPT);
    let engine = harness.script("hang.sh", HANGING_ENGINE_SCRIPT);
    let local = harness.local(&server);
    let candidate = local.server_spec("candidate", &harness.strategy("mine.py"), 18_421);
    let reference = local.server_spec("reference", &harness.strategy("theirs.py"), 18_422);

    let started = std::time::Instant::now();
    let err = harness
        .runner(Duration::from_secs(5), Duration::from_millis(500))
        .run_match(&candidate, &reference, &harness.engine(&engine))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MatchTimeout(_)));
    assert!(harness.scripts.path().join("engine.started").exists());
    assert!(started.elapsed() < Duration::from_secs(10));
    harness.assert_work_root_empty();
}
