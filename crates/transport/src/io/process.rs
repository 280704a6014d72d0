//! Child process transport implementation

use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{DapTransport, PeerControl};
use crate::error::{Error, Result};

/// Transport over the standard input and output of a debug adapter process
///
/// The adapter's stderr is drained on a background thread into the log so that a chatty
/// adapter can never block on a full pipe.
///
/// ```no_run
/// use std::path::Path;
/// use transport::{Client, io::ProcessTransport};
///
/// let transport = ProcessTransport::start(Path::new("mock-debug-adapter"), &["--stdio"], None)?;
/// let client = Client::with_transport(transport, Vec::new())?;
/// # Ok::<(), transport::Error>(())
/// ```
pub struct ProcessTransport {
    process: AdapterProcess,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// Owned handle on a running adapter process; killed when dropped
pub struct AdapterProcess {
    child: Child,
    command: PathBuf,
}

impl ProcessTransport {
    /// Spawn `command` with its stdio redirected
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailure`] if the process could not be created.
    #[tracing::instrument(skip(arguments))]
    pub fn start<S>(
        command: &Path,
        arguments: &[S],
        working_directory: Option<&Path>,
    ) -> Result<Self>
    where
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(command);
        cmd.args(arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        hide_console_window(&mut cmd);

        let launch_failure = |source| Error::LaunchFailure {
            command: command.to_path_buf(),
            source,
        };

        let child = cmd.spawn().map_err(launch_failure)?;
        tracing::debug!(pid = child.id(), "spawned debug adapter");

        // killed on drop if we bail out below
        let mut process = AdapterProcess {
            command: command.to_path_buf(),
            child,
        };
        let missing = |name: &str| {
            launch_failure(std::io::Error::other(format!("{name} was not captured")))
        };
        let stdin = process.child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = process.child.stdout.take().ok_or_else(|| missing("stdout"))?;
        if let Some(stderr) = process.child.stderr.take() {
            let name = command.display().to_string();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => tracing::debug!(adapter = %name, %line, "adapter stderr"),
                        Err(_) => break,
                    }
                }
            });
        }

        Ok(Self {
            process,
            stdin,
            stdout,
        })
    }

    pub fn id(&self) -> u32 {
        self.process.child.id()
    }
}

impl DapTransport for ProcessTransport {
    type Reader = BufReader<ChildStdout>;
    type Writer = ChildStdin;

    fn split(self) -> Result<(Self::Reader, Self::Writer, Box<dyn PeerControl>)> {
        Ok((
            BufReader::new(self.stdout),
            self.stdin,
            Box::new(self.process),
        ))
    }
}

impl PeerControl for AdapterProcess {
    fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(command = %self.command.display(), %status, "adapter already exited");
            }
            _ => {
                tracing::debug!(command = %self.command.display(), "killing adapter process");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }

    fn exit_code(&mut self, grace: Duration) -> Option<i32> {
        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) if start.elapsed() < grace => thread::sleep(Duration::from_millis(10)),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "could not query adapter exit status");
                    return None;
                }
            }
        }
    }
}

impl Drop for AdapterProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_executable_is_launch_failure() {
        let result = ProcessTransport::start::<&str>(
            Path::new("/definitely/not/a/debug-adapter"),
            &[],
            None,
        );

        match result {
            Err(Error::LaunchFailure { command, .. }) => {
                assert_eq!(command, Path::new("/definitely/not/a/debug-adapter"));
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("expected launch failure"),
        }
    }

    #[test]
    fn echoes_through_cat() -> eyre::Result<()> {
        let transport = ProcessTransport::start::<&str>(Path::new("cat"), &[], None)?;
        let (mut reader, mut writer, mut control) = transport.split()?;

        writer.write_all(b"hello\n")?;
        writer.flush()?;
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert_eq!(line, "hello\n");

        drop(writer);
        assert_eq!(control.exit_code(Duration::from_secs(5)), Some(0));
        Ok(())
    }

    #[test]
    fn reports_exit_code() -> eyre::Result<()> {
        let transport = ProcessTransport::start(Path::new("sh"), &["-c", "exit 3"], None)?;
        let (_reader, _writer, mut control) = transport.split()?;

        assert_eq!(control.exit_code(Duration::from_secs(5)), Some(3));
        // terminating an exited process is harmless
        control.terminate();
        control.terminate();
        Ok(())
    }
}
