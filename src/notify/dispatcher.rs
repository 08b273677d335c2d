//! Notifier implementations
//!
//! The production dispatcher shells out to an external notification CLI
//! (`<command> enqueue --pointer ... --metadata ...`) with a bounded
//! timeout so one hung dispatcher cannot stall a whole send batch. The
//! no-op and recording variants exist so the dispatch engine can be
//! tested without the external dependency.

use super::{Notifier, NotifyRequest};
use crate::error::{MaildropError, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Discards every notification
///
/// Used when no dispatcher command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, request: &NotifyRequest) -> Result<()> {
        tracing::debug!(
            to_agent = %request.to_agent,
            pointer = %request.pointer,
            "no notifier configured; dropping notification"
        );
        Ok(())
    }
}

/// Records every notification for later inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotifyRequest>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the requests dispatched so far
    pub fn sent(&self) -> Vec<NotifyRequest> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, request: &NotifyRequest) -> Result<()> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        Ok(())
    }
}

/// Dispatches by invoking an external notification CLI
#[derive(Debug, Clone)]
pub struct SubprocessNotifier {
    command: PathBuf,
    timeout: Duration,
}

impl SubprocessNotifier {
    /// Notifier invoking `command` with the enqueue call contract
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl Notifier for SubprocessNotifier {
    fn notify(&self, request: &NotifyRequest) -> Result<()> {
        let metadata = serde_json::to_string(&request.metadata)
            .map_err(|e| MaildropError::NotifyDispatch(format!("metadata encoding: {}", e)))?;

        let mut child = Command::new(&self.command)
            .arg("enqueue")
            .arg("--pointer")
            .arg(&request.pointer)
            .arg("--project")
            .arg(&request.project)
            .arg("--to-agent")
            .arg(&request.to_agent)
            .arg("--provider")
            .arg(&request.provider)
            .arg("--session-prefix")
            .arg(&request.session_prefix)
            .arg("--metadata")
            .arg(&metadata)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                MaildropError::NotifyDispatch(format!(
                    "failed to launch {}: {}",
                    self.command.display(),
                    e
                ))
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(MaildropError::NotifyDispatch(format!(
                        "{} exited with {}",
                        self.command.display(),
                        status
                    )));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(MaildropError::NotifyDispatch(format!(
                            "{} timed out after {:?}",
                            self.command.display(),
                            self.timeout
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MaildropError::NotifyDispatch(format!(
                        "waiting on {}: {}",
                        self.command.display(),
                        e
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyMetadata;

    fn test_request() -> NotifyRequest {
        NotifyRequest {
            pointer: "msg/2026-08-07T09-00-00.000Z—kickoff/STATUS__agp@pmo__kickoff.yaml"
                .to_string(),
            project: "default".to_string(),
            to_agent: "PMO".to_string(),
            provider: "local".to_string(),
            session_prefix: "maildrop".to_string(),
            metadata: NotifyMetadata {
                subject: "Kickoff".to_string(),
                thread_tid: "T-3F9A2C1B".to_string(),
                from: "AGP".to_string(),
                to: "PMO".to_string(),
                kind: "STATUS".to_string(),
                status: Some("TODO".to_string()),
            },
        }
    }

    #[test]
    fn test_recording_notifier_captures() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&test_request()).unwrap();
        notifier.notify(&test_request()).unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to_agent, "PMO");
    }

    #[test]
    fn test_metadata_json_shape() {
        let json = serde_json::to_string(&test_request().metadata).unwrap();
        assert!(json.contains("\"type\":\"STATUS\""));
        assert!(json.contains("\"thread_tid\":\"T-3F9A2C1B\""));
        assert!(json.contains("\"status\":\"TODO\""));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn write_script(dir: &TempDir, body: &str) -> std::path::PathBuf {
            let path = dir.path().join("notify.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[test]
        fn test_successful_dispatch() {
            let dir = TempDir::new().unwrap();
            let capture = dir.path().join("args.txt");
            let script = write_script(
                &dir,
                &format!("printf '%s\\n' \"$@\" > {}", capture.display()),
            );

            let notifier = SubprocessNotifier::new(script, Duration::from_secs(5));
            notifier.notify(&test_request()).unwrap();

            let args = std::fs::read_to_string(capture).unwrap();
            assert!(args.starts_with("enqueue\n"));
            assert!(args.contains("--pointer"));
            assert!(args.contains("--to-agent\nPMO"));
            assert!(args.contains("--metadata"));
        }

        #[test]
        fn test_nonzero_exit_is_dispatch_error() {
            let dir = TempDir::new().unwrap();
            let script = write_script(&dir, "exit 3");

            let notifier = SubprocessNotifier::new(script, Duration::from_secs(5));
            let err = notifier.notify(&test_request()).unwrap_err();
            assert!(matches!(err, MaildropError::NotifyDispatch(_)));
        }

        #[test]
        fn test_hung_dispatcher_times_out() {
            let dir = TempDir::new().unwrap();
            let script = write_script(&dir, "sleep 60");

            let notifier = SubprocessNotifier::new(script, Duration::from_millis(200));
            let err = notifier.notify(&test_request()).unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }

        #[test]
        fn test_missing_command_is_dispatch_error() {
            let notifier = SubprocessNotifier::new("/does/not/exist", Duration::from_secs(1));
            let err = notifier.notify(&test_request()).unwrap_err();
            assert!(matches!(err, MaildropError::NotifyDispatch(_)));
        }
    }
}
