//! External command execution behind a small runner interface

use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::utils::errors::CommandError;

/// How often a running child is polled while waiting for it to exit
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A single child-process invocation: program, arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability to run external commands.
///
/// `run` only fails when the command could not be started or did not finish
/// in time; a nonzero exit is reported through [`CommandOutput::code`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;

    /// Run and turn a nonzero exit into [`CommandError::NonZeroExit`]
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        crate::log_debug!("Running: {}", invocation);
        let output = self.run(invocation)?;

        if !output.success() {
            return Err(CommandError::NonZeroExit {
                command: invocation.to_string(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}

/// Runs invocations as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// `None` waits for the child indefinitely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&self, child: &mut Child, invocation: &Invocation) -> Result<Option<i32>, CommandError> {
        let spawn_err = |source| CommandError::SpawnFailed {
            command: invocation.to_string(),
            source,
        };

        let Some(timeout) = self.timeout else {
            return child.wait().map(|status| status.code()).map_err(spawn_err);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(spawn_err)? {
                return Ok(status.code());
            }

            if Instant::now() >= deadline {
                // The child may exit between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::TimedOut {
                    command: invocation.to_string(),
                    timeout,
                });
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Drain a child pipe on its own thread so a full pipe never blocks the child
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| CommandError::SpawnFailed {
            command: invocation.to_string(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let code = self.wait(&mut child, invocation)?;

        Ok(CommandOutput {
            code,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}
