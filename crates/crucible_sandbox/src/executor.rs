//! Container invocation and outcome classification.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::metrics::METRICS;

pub const TIMEOUT_DIAGNOSTIC: &str = "Error: Execution timed out.";

/// Sandbox configuration (plain data).
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container runtime binary (`podman` works rootless; `docker` also fits).
    pub runtime: PathBuf,
    /// Interpreter image.
    pub image: String,
    /// Interpreter command inside the image; given `-` to read stdin.
    pub interpreter: String,
    /// Memory cap.
    pub memory: String,
    /// CPU cap.
    pub cpus: String,
    /// Process cap.
    pub pids_limit: u32,
    /// Syscall allow-list profile, loaded by the runtime from this path.
    pub seccomp_profile: PathBuf,
    /// Hard wall-clock limit for one execution.
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: PathBuf::from("podman"),
            image: "docker.io/library/python:3.9-slim".to_string(),
            interpreter: "python".to_string(),
            memory: "128m".to_string(),
            cpus: "0.5".to_string(),
            pids_limit: 64,
            seccomp_profile: PathBuf::from("profiles/seccomp.json"),
            timeout: Duration::from_secs(10),
        }
    }
}

/// What the worker should commit for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exit 0; output is the merged stdout.
    Clean,
    /// Non-zero exit; output carries the code and captured stderr.
    NonZeroExit,
    /// Wall clock exceeded; the process tree was terminated.
    TimedOut,
    /// The executor itself failed (spawn, I/O); output carries the detail.
    SystemError,
}

/// Result of one sandboxed run. `output` is always the user-facing
/// string: merged stdout on success, a diagnostic otherwise.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub verdict: Verdict,
    pub output: String,
}

impl RunReport {
    pub fn failed(&self) -> bool {
        self.verdict != Verdict::Clean
    }
}

/// Seam between the worker loop and the container runtime, so the
/// pipeline is testable without podman installed.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, artifact: &[u8]) -> RunReport;
}

/// The real executor.
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    /// Validates the syscall profile up front: a sandbox without its
    /// filter must never launch anything.
    pub fn new(config: SandboxConfig) -> anyhow::Result<Self> {
        if !config.seccomp_profile.is_file() {
            anyhow::bail!(
                "Syscall filter profile not found: {}",
                config.seccomp_profile.display()
            );
        }
        info!(
            "Sandbox ready: runtime={}, image={}, profile={}",
            config.runtime.display(),
            config.image,
            config.seccomp_profile.display()
        );
        Ok(Self { config })
    }

    /// The full argument vector after the runtime binary. Kept as a pure
    /// function of the config so the containment table is assertable.
    pub fn command_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--network".to_string(),
            "none".to_string(),
            "--memory".to_string(),
            self.config.memory.clone(),
            "--cpus".to_string(),
            self.config.cpus.clone(),
            "--pids-limit".to_string(),
            self.config.pids_limit.to_string(),
            "--cap-drop".to_string(),
            "ALL".to_string(),
            "--security-opt".to_string(),
            format!("seccomp={}", self.config.seccomp_profile.display()),
            self.config.image.clone(),
            self.config.interpreter.clone(),
            "-".to_string(),
        ]
    }

    async fn run_inner(&self, artifact: &[u8]) -> RunReport {
        let mut command = Command::new(&self.config.runtime);
        command
            .args(self.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (timeout path) must tear the runtime down.
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                METRICS.inc_system_errors();
                return RunReport {
                    verdict: Verdict::SystemError,
                    output: format!("System Error: {}", e),
                };
            }
        };
        METRICS.inc_launches();

        // Stream the script to the interpreter; closing stdin is the EOF
        // the interpreter waits for. The write happens inside the timeout
        // window: a container that never reads its stdin must not stall
        // the worker. A write failure usually means the container died
        // early - fall through and report its exit.
        let stdin = child.stdin.take();
        let script = artifact.to_vec();
        let guarded = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&script).await {
                    warn!("Short write to sandbox stdin: {}", e);
                }
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.config.timeout, guarded).await {
            Err(_) => {
                // Child is dropped by the elapsed branch; kill_on_drop
                // terminates the runtime and, with --rm, the container.
                METRICS.inc_timeouts();
                return RunReport {
                    verdict: Verdict::TimedOut,
                    output: TIMEOUT_DIAGNOSTIC.to_string(),
                };
            }
            Ok(Err(e)) => {
                METRICS.inc_system_errors();
                return RunReport {
                    verdict: Verdict::SystemError,
                    output: format!("System Error: {}", e),
                };
            }
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            METRICS.inc_clean_exits();
            RunReport {
                verdict: Verdict::Clean,
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
            }
        } else {
            METRICS.inc_nonzero_exits();
            let stderr = String::from_utf8_lossy(&output.stderr);
            let output = match output.status.code() {
                Some(code) => format!("Error (Exit Code {}):\n{}", code, stderr),
                None => format!("Error: Interpreter terminated by signal.\n{}", stderr),
            };
            RunReport {
                verdict: Verdict::NonZeroExit,
                output,
            }
        }
    }
}

#[async_trait]
impl ScriptRunner for SandboxExecutor {
    async fn run(&self, artifact: &[u8]) -> RunReport {
        self.run_inner(artifact).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_profile(dir: &tempfile::TempDir) -> SandboxConfig {
        let profile = dir.path().join("seccomp.json");
        let mut f = std::fs::File::create(&profile).unwrap();
        f.write_all(b"{\"defaultAction\": \"SCMP_ACT_ERRNO\"}").unwrap();
        SandboxConfig {
            seccomp_profile: profile,
            ..SandboxConfig::default()
        }
    }

    #[test]
    fn test_missing_profile_refuses_to_construct() {
        let config = SandboxConfig {
            seccomp_profile: PathBuf::from("/nonexistent/profile.json"),
            ..SandboxConfig::default()
        };
        assert!(SandboxExecutor::new(config).is_err());
    }

    #[test]
    fn test_containment_flags_all_present() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new(config_with_profile(&dir)).unwrap();
        let args = executor.command_args();

        let joined = args.join(" ");
        assert!(joined.contains("--rm"));
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--memory 128m"));
        assert!(joined.contains("--cpus 0.5"));
        assert!(joined.contains("--pids-limit 64"));
        assert!(joined.contains("--cap-drop ALL"));
        assert!(joined.contains("--security-opt seccomp="));

        // Stdin streaming: interactive flag present, script delivered as
        // `interpreter -`, and no volume mount anywhere.
        assert!(args.contains(&"-i".to_string()));
        assert_eq!(args.last().unwrap(), "-");
        assert!(!joined.contains("-v "));
        assert!(!joined.contains("--volume"));
    }

    #[test]
    fn test_image_and_interpreter_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new(config_with_profile(&dir)).unwrap();
        let args = executor.command_args();

        let image_pos = args
            .iter()
            .position(|a| a == "docker.io/library/python:3.9-slim")
            .unwrap();
        assert_eq!(args[image_pos + 1], "python");
        assert_eq!(args[image_pos + 2], "-");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            runtime: PathBuf::from("/nonexistent/container-runtime"),
            ..config_with_profile(&dir)
        };
        let executor = SandboxExecutor::new(config).unwrap();

        let report = executor.run(b"print('hi')").await;
        assert_eq!(report.verdict, Verdict::SystemError);
        assert!(report.output.starts_with("System Error: "));
        assert!(report.failed());
    }
}
