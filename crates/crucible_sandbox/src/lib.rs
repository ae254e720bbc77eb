//! Sandbox executor: runs an artifact inside an isolated container.
//!
//! The script is streamed to the interpreter on stdin; nothing from the
//! host filesystem is mounted into the container. Every containment
//! control (network, memory, cpu, pids, capabilities, seccomp, ephemeral
//! root, wall clock) is mandatory; the executor refuses to construct
//! without a syscall profile on disk.
//!
//! Failures never propagate as errors: the report carries a diagnostic
//! string with a recognizable prefix instead, and the verdict tells the
//! worker which terminal status to commit.

pub mod executor;
pub mod metrics;

pub use executor::{RunReport, SandboxConfig, SandboxExecutor, ScriptRunner, Verdict};
pub use metrics::METRICS;
