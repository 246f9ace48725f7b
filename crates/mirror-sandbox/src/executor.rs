//! Sandbox executor
//!
//! Runs approved worker code in a subprocess with no ambient authority:
//! scratch directory only, cleared environment, piped stdio, wall-clock
//! timeout, and an output byte cap. Concurrency is bounded by a global
//! worker pool; admissions beyond the cap queue FIFO behind a semaphore
//! with their own timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use mirror_core::{MirrorError, Result, SandboxQuotas};

use crate::registry::{WorkerManifest, WorkerStatus};

/// Structured result of one sandbox execution
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    /// Parsed JSON the worker wrote to stdout
    pub result: serde_json::Value,
    pub duration_ms: u64,
}

/// The sandbox executor
pub struct SandboxExecutor {
    /// Interpreter binary invoked as `{interpreter} {code_file} {entrypoint}`
    interpreter: std::path::PathBuf,
    quotas: SandboxQuotas,
    permits: Arc<Semaphore>,
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<std::path::PathBuf>, quotas: SandboxQuotas) -> Self {
        let permits = Arc::new(Semaphore::new(quotas.max_concurrent));
        Self {
            interpreter: interpreter.into(),
            quotas,
            permits,
        }
    }

    /// Execute an approved worker with the given JSON input on stdin.
    ///
    /// Refuses manifests that are not `approved` or whose signature does
    /// not verify; nothing else ever reaches the interpreter.
    pub async fn execute(
        &self,
        manifest: &WorkerManifest,
        input: &serde_json::Value,
    ) -> Result<SandboxOutcome> {
        if manifest.status != WorkerStatus::Approved {
            return Err(MirrorError::unauthorized(format!(
                "worker {} is {}, not approved",
                manifest.worker_id, manifest.status
            )));
        }
        manifest.verify_signature()?;

        let _permit = tokio::time::timeout(
            self.quotas.admission_timeout(),
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            MirrorError::sandbox("timeout", "admission queue wait exceeded its timeout")
        })?
        .map_err(|_| MirrorError::internal("sandbox admission semaphore closed"))?;

        let scratch = tempfile::tempdir()
            .map_err(|e| MirrorError::sandbox("parse_error", format!("scratch dir: {e}")))?;
        let code_path = scratch.path().join("worker_code");
        tokio::fs::write(&code_path, &manifest.code)
            .await
            .map_err(|e| MirrorError::sandbox("parse_error", format!("write code: {e}")))?;

        let started = Instant::now();
        let mut child = tokio::process::Command::new(&self.interpreter)
            .arg(&code_path)
            .arg(&manifest.entrypoint)
            .current_dir(scratch.path())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MirrorError::sandbox("signal", format!("spawn failed: {e}")))?;

        let input_bytes = serde_json::to_vec(input)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input_bytes)
                .await
                .map_err(|e| MirrorError::sandbox("signal", format!("stdin write: {e}")))?;
            drop(stdin);
        }

        let output = match tokio::time::timeout(
            self.quotas.time_limit(),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(MirrorError::sandbox("signal", format!("wait failed: {e}")));
            }
            Err(_) => {
                // kill_on_drop terminates the isolate.
                tracing::warn!(worker = %manifest.worker_id, "sandbox execution timed out");
                return Err(MirrorError::sandbox(
                    "timeout",
                    format!("exceeded {}ms", self.quotas.time_ms),
                ));
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if !output.status.success() {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = output.status.signal() {
                    // SIGKILL is what the OOM killer delivers.
                    let kind = if signal == 9 { "oom" } else { "signal" };
                    return Err(MirrorError::sandbox(
                        kind,
                        format!("terminated by signal {signal}"),
                    ));
                }
            }
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::sandbox(
                "exit_nonzero",
                format!("exit code {code}: {}", stderr.chars().take(200).collect::<String>()),
            ));
        }

        if output.stdout.len() as u64 > self.quotas.output_bytes {
            return Err(MirrorError::sandbox(
                "output_too_large",
                format!(
                    "{} bytes exceeds cap of {}",
                    output.stdout.len(),
                    self.quotas.output_bytes
                ),
            ));
        }

        let result: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            MirrorError::sandbox("parse_error", format!("worker output is not JSON: {e}"))
        })?;

        tracing::debug!(worker = %manifest.worker_id, duration_ms, "sandbox execution complete");
        Ok(SandboxOutcome {
            result,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkerRegistry;
    use mirror_core::Ed25519SigningKey;

    // `sh` as the interpreter keeps these tests hermetic: the "code" file
    // is a shell script and the entrypoint arg is ignored by it.
    fn executor(quotas: SandboxQuotas) -> SandboxExecutor {
        SandboxExecutor::new("/bin/sh", quotas)
    }

    fn approved_manifest(code: &str) -> WorkerManifest {
        let author = Ed25519SigningKey::generate();
        let mut manifest = WorkerManifest {
            worker_id: mirror_core::WorkerId::new(),
            name: "t".into(),
            version: "1.0.0".into(),
            code: code.into(),
            entrypoint: "main".into(),
            required_permissions: vec![],
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            author: String::new(),
            signature: String::new(),
            status: WorkerStatus::Proposed,
        };
        manifest.sign(&author).unwrap();
        let registry = WorkerRegistry::new();
        let id = registry.register(manifest).unwrap();
        registry.approve(id, "test", None).unwrap();
        registry.get(id).unwrap()
    }

    fn quotas() -> SandboxQuotas {
        SandboxQuotas {
            time_ms: 5_000,
            output_bytes: 4_096,
            max_concurrent: 2,
            admission_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn successful_execution_parses_json() {
        let manifest = approved_manifest("cat > /dev/null; echo '{\"ok\": true}'");
        let outcome = executor(quotas())
            .execute(&manifest, &serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(outcome.result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn unapproved_worker_refused() {
        let mut manifest = approved_manifest("echo '{}'");
        manifest.status = WorkerStatus::Proposed;
        let err = executor(quotas())
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_the_isolate() {
        let manifest = approved_manifest("cat > /dev/null; sleep 30");
        let tight = SandboxQuotas {
            time_ms: 200,
            ..quotas()
        };
        let err = executor(tight)
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sandbox { ref kind, .. } if kind == "timeout"));
    }

    #[tokio::test]
    async fn nonzero_exit_reported() {
        let manifest = approved_manifest("cat > /dev/null; exit 3");
        let err = executor(quotas())
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sandbox { ref kind, .. } if kind == "exit_nonzero"));
    }

    #[tokio::test]
    async fn oversized_output_rejected() {
        let manifest =
            approved_manifest("cat > /dev/null; head -c 8192 /dev/zero | tr '\\0' 'a'");
        let err = executor(quotas())
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sandbox { ref kind, .. } if kind == "output_too_large"));
    }

    #[tokio::test]
    async fn non_json_output_is_parse_error() {
        let manifest = approved_manifest("cat > /dev/null; echo not-json");
        let err = executor(quotas())
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sandbox { ref kind, .. } if kind == "parse_error"));
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        std::env::set_var("MIRROR_SANDBOX_PROBE", "leaked");
        let manifest = approved_manifest(
            "cat > /dev/null; printf '{\"env\": \"%s\"}' \"$MIRROR_SANDBOX_PROBE\"",
        );
        let outcome = executor(quotas())
            .execute(&manifest, &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.result, serde_json::json!({"env": ""}));
    }

    #[tokio::test]
    async fn admission_queue_times_out_when_pool_is_full() {
        let slow = SandboxQuotas {
            time_ms: 10_000,
            output_bytes: 4_096,
            max_concurrent: 1,
            admission_timeout_ms: 100,
        };
        let executor = Arc::new(SandboxExecutor::new("/bin/sh", slow));
        let blocker = approved_manifest("cat > /dev/null; sleep 5; echo '{}'");
        let quick = approved_manifest("cat > /dev/null; echo '{}'");

        let executor_bg = Arc::clone(&executor);
        let handle = tokio::spawn(async move {
            let _ = executor_bg.execute(&blocker, &serde_json::json!({})).await;
        });
        // Give the blocker time to take the only permit.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let err = executor
            .execute(&quick, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sandbox { ref kind, .. } if kind == "timeout"));
        handle.abort();
    }
}
