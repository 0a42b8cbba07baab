//! Abstraction over external command execution.
//!
//! [`CommandRunner`] allows swapping the real system command execution
//! ([`SystemCommandRunner`]) with a mock in tests. VPN detection relies on
//! platform tools (`scutil`, `netstat`) that are unavailable in CI or on
//! other platforms; injecting a [`CommandRunner`] keeps the parsers and the
//! detector testable without them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::string::FromUtf8Error;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Default bound on how long a command may run before being killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the command timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Time left to the output reader once the child has exited, even when the
/// deadline is already reached.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Interval between two checks of the child process state.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors raised while running an external command.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unable to launch `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Unable to wait for `{program}`")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` exited with {}", display_code(.code))]
    Status { program: String, code: Option<i32> },
    #[error("Unable to capture output of `{program}`")]
    Capture {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` output is not valid UTF-8")]
    NotUtf8 {
        program: String,
        #[source]
        source: FromUtf8Error,
    },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (killed by signal)".to_owned(),
    }
}

/// Trait for running external commands and capturing their output.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with the given `args` and return its merged
    /// stdout/stderr as a [`String`].
    ///
    /// Only a zero exit status counts as success.
    fn run(&self, program: &str, args: &[String]) -> Result<String, CommandError>;
}

/// Default implementation that delegates to [`std::process::Command`].
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    /// Create a runner killing commands that last longer than `timeout`,
    /// capped at [`MAX_TIMEOUT`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.min(MAX_TIMEOUT),
        }
    }

    fn wait_until_deadline(
        &self,
        program: &str,
        child: &mut std::process::Child,
        deadline: Instant,
    ) -> Result<ExitStatus, CommandError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::TimedOut {
                        program: program.to_owned(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::Wait {
                        program: program.to_owned(),
                        source,
                    });
                }
            }
        }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, CommandError> {
        let capture_error = |source: io::Error| CommandError::Capture {
            program: program.to_owned(),
            source,
        };
        // stdout and stderr share one pipe so the capture keeps arrival order.
        let (mut reader, writer) = io::pipe().map_err(capture_error)?;
        let stderr_writer = writer.try_clone().map_err(capture_error)?;

        let deadline = Instant::now()
            .checked_add(self.timeout)
            .ok_or_else(|| CommandError::TimedOut {
                program: program.to_owned(),
                timeout: self.timeout,
            })?;
        let mut child = {
            let mut command = Command::new(program);
            command
                .args(args)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr_writer);
            // `command` owns our copies of the write end: it must be dropped
            // before draining, otherwise the reader never sees EOF.
            command.spawn().map_err(|source| CommandError::Spawn {
                program: program.to_owned(),
                source,
            })?
        };
        trace!("Spawned {} {:?} (pid {})", program, args, child.id());

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = sender.send(reader.read_to_end(&mut buf).map(|_| buf));
        });

        let status = self.wait_until_deadline(program, &mut child, deadline)?;
        // A background grandchild may keep the pipe open after the child exits.
        let captured = match receiver.recv_timeout(drain_wait(deadline, Instant::now())) {
            Ok(res) => res.map_err(capture_error)?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(CommandError::TimedOut {
                    program: program.to_owned(),
                    timeout: self.timeout,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(capture_error(io::Error::other("output reader stopped")));
            }
        };

        if !status.success() {
            return Err(CommandError::Status {
                program: program.to_owned(),
                code: status.code(),
            });
        }
        String::from_utf8(captured).map_err(|source| CommandError::NotUtf8 {
            program: program.to_owned(),
            source,
        })
    }
}

/// How long to wait for the captured output once the child has exited.
fn drain_wait(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now).max(DRAIN_GRACE)
}

/// A program and its arguments, written as a single shell-quoted string in
/// configuration files and on the command line.
///
/// ```
/// use lib::command::CommandLine;
/// let cmd: CommandLine = "/usr/sbin/netstat -rn -f inet".parse().unwrap();
/// assert_eq!(cmd.program, "/usr/sbin/netstat");
/// assert_eq!(cmd.args, ["-rn", "-f", "inet"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable path or name looked up in `PATH`
    pub program: String,
    /// Arguments passed verbatim
    pub args: Vec<String>,
}

impl CommandLine {
    /// Build a command line from its parts.
    pub fn new(program: &str, args: &[&str]) -> Self {
        CommandLine {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Run the command line through `runner`.
    pub fn run_with(&self, runner: &dyn CommandRunner) -> Result<String, CommandError> {
        runner.run(&self.program, &self.args)
    }
}

impl std::str::FromStr for CommandLine {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = shell_words::split(s)?.into_iter();
        match words.next() {
            Some(program) if !program.is_empty() => Ok(CommandLine {
                program,
                args: words.collect(),
            }),
            _ => anyhow::bail!("Expect a program name in command '{}'", s),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(self.args.iter());
        write!(f, "{}", shell_words::join(words))
    }
}

impl Serialize for CommandLine {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommandLine {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}


#[cfg(all(test, unix))]
mod system_runner_should {
    use super::*;
    use test_log::test;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_owned(), script.to_owned()]
    }

    #[test]
    fn capture_stdout_on_success() {
        let runner = SystemCommandRunner::default();
        let out = runner.run("/bin/sh", &sh("echo hello")).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn merge_stderr_into_capture() {
        let runner = SystemCommandRunner::default();
        let out = runner
            .run("/bin/sh", &sh("echo out; echo err 1>&2; echo again"))
            .unwrap();
        assert_eq!(out, "out\nerr\nagain\n");
    }

    #[test]
    fn fail_on_non_zero_exit() {
        let runner = SystemCommandRunner::default();
        match runner.run("/bin/sh", &sh("echo partial; exit 3")) {
            Err(CommandError::Status { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn fail_when_program_is_missing() {
        let runner = SystemCommandRunner::default();
        assert!(matches!(
            runner.run("/nonexistent/netposture-test-binary", &[]),
            Err(CommandError::Spawn { .. })
        ));
    }

    #[test]
    fn fail_on_invalid_utf8() {
        let runner = SystemCommandRunner::default();
        assert!(matches!(
            runner.run("/bin/sh", &sh("printf '\\377\\376'")),
            Err(CommandError::NotUtf8 { .. })
        ));
    }

    #[test]
    fn kill_command_exceeding_timeout() {
        let runner = SystemCommandRunner::new(Duration::from_millis(200));
        let start = Instant::now();
        let res = runner.run("/bin/sh", &sh("exec sleep 10"));
        assert!(matches!(res, Err(CommandError::TimedOut { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cap_huge_timeout() {
        let runner = SystemCommandRunner::new(Duration::MAX);
        let out = runner.run("/bin/sh", &sh("echo ok")).unwrap();
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn leave_output_reader_a_grace_period_past_deadline() {
        let now = Instant::now();
        assert_eq!(drain_wait(now, now + Duration::from_secs(1)), DRAIN_GRACE);
        assert_eq!(drain_wait(now, now), DRAIN_GRACE);
        assert_eq!(
            drain_wait(now + Duration::from_secs(3), now),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn give_up_when_background_process_holds_output() {
        let runner = SystemCommandRunner::new(Duration::from_millis(300));
        let start = Instant::now();
        let res = runner.run("/bin/sh", &sh("sleep 10 & echo started"));
        assert!(matches!(res, Err(CommandError::TimedOut { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn drain_large_output_without_blocking() {
        let runner = SystemCommandRunner::default();
        let out = runner
            .run("/bin/sh", &sh("i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done"))
            .unwrap();
        assert_eq!(out.lines().count(), 20000);
    }
}
