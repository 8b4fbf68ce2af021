use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::error::{CoreError, CoreResult};

/// One running child process. `try_wait` must be cheap enough to poll.
pub trait ProcessHandle: Send {
    fn try_wait(&mut self) -> CoreResult<Option<i32>>;
    fn kill(&mut self) -> CoreResult<()>;
}

pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, exe: &Path, args: &[String]) -> CoreResult<Box<dyn ProcessHandle>>;
}

pub struct StdProcessRunner;

impl ProcessRunner for StdProcessRunner {
    fn spawn(&self, exe: &Path, args: &[String]) -> CoreResult<Box<dyn ProcessHandle>> {
        let child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    CoreError::MissingExecutable(exe.display().to_string())
                } else {
                    CoreError::Process(err.to_string())
                }
            })?;
        Ok(Box::new(StdProcessHandle { child }))
    }
}

struct StdProcessHandle {
    child: Child,
}

impl ProcessHandle for StdProcessHandle {
    fn try_wait(&mut self) -> CoreResult<Option<i32>> {
        match self.child.try_wait() {
            // a status without a code means the process died to a signal
            Ok(Some(status)) => Ok(Some(status.code().unwrap_or(-1))),
            Ok(None) => Ok(None),
            Err(err) => Err(CoreError::Process(err.to_string())),
        }
    }

    fn kill(&mut self) -> CoreResult<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(CoreError::Process(err.to_string())),
        }
    }
}
