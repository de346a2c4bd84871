use crate::BackendError;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Executable used to mount the clustered filesystem.
pub const CEPH_FUSE: &str = "ceph-fuse";

/// Runs one external command to completion.
pub trait Invoker: Send + Sync {
    fn invoke(&self, executable: &str, args: &[String]) -> Result<(), BackendError>;
}

/// [`Invoker`] backed by a real child process.
///
/// Stdout is streamed into the debug log and otherwise ignored; success is
/// decided by the exit status alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellInvoker;

fn command_failed(executable: &str, reason: impl Into<String>) -> BackendError {
    BackendError::CommandFailed {
        command: executable.to_owned(),
        reason: reason.into(),
    }
}

impl Invoker for ShellInvoker {
    fn invoke(&self, executable: &str, args: &[String]) -> Result<(), BackendError> {
        info!("invoking {executable} {}", args.join(" "));

        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| command_failed(executable, format!("failed to start: {e}")))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(command_failed(executable, "unable to attach to stdout"));
        };

        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => debug!("{executable}: {line}"),
                Err(e) => {
                    warn!("{executable}: stdout read failed: {e}");
                    break;
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| command_failed(executable, format!("wait failed: {e}")))?;
        if status.success() {
            debug!("{executable} finished");
            Ok(())
        } else {
            Err(command_failed(executable, status.to_string()))
        }
    }
}
