//! The single seam through which every privileged mutation is issued.

use crate::error::{PatchError, PatchResult};
use std::cell::RefCell;
use std::process::Command;
use tracing::debug;

/// Exit code plus stdout and stderr, concatenated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait PrivilegedRunner {
    fn run(&self, program: &str, args: &[&str], elevated: bool) -> PatchResult<CommandOutput>;

    /// Like [`PrivilegedRunner::run`] but a non-zero exit becomes [`PatchError::CommandFailed`].
    fn run_checked(&self, program: &str, args: &[&str], elevated: bool) -> PatchResult<CommandOutput> {
        let out = self.run(program, args, elevated)?;
        if !out.success() {
            return Err(PatchError::CommandFailed {
                command: command_line(program, args),
                code: out.code,
                output: out.output,
            });
        }
        Ok(out)
    }

    /// Elevated and checked, the common case for root volume work.
    fn root(&self, program: &str, args: &[&str]) -> PatchResult<CommandOutput> {
        self.run_checked(program, args, true)
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Runs commands on the host. Elevated commands go through `sudo -n` unless already root.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn is_root() -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
}

impl PrivilegedRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], elevated: bool) -> PatchResult<CommandOutput> {
        debug!(elevated, "exec {}", command_line(program, args));
        let mut command = if elevated && !Self::is_root() {
            let mut sudo = Command::new("/usr/bin/sudo");
            sudo.arg("-n").arg(program);
            sudo
        } else {
            Command::new(program)
        };
        let output = command.args(args).output()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub line: String,
    pub elevated: bool,
}

/// Records commands instead of running them. Backs `--dry-run` and the tests.
///
/// Responses are matched against the rendered command line by prefix, first match
/// wins; anything unmatched succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<RecordedCommand>>,
    responses: Vec<(String, CommandOutput)>,
    live: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, code: i32, output: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            CommandOutput {
                code,
                output: output.to_string(),
            },
        ));
        self
    }

    /// Unelevated commands starting with `prefix` really run. Only for read-only probes.
    pub fn live(mut self, prefix: &str) -> Self {
        self.live.push(prefix.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|call| call.line.clone()).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|call| call.line.starts_with(prefix))
    }
}

impl PrivilegedRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[&str], elevated: bool) -> PatchResult<CommandOutput> {
        let line = command_line(program, args);
        if !elevated && self.live.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            let out = SystemRunner.run(program, args, false).unwrap_or_else(|err| {
                debug!("probe {} unavailable: {}", line, err);
                CommandOutput {
                    code: -1,
                    output: String::new(),
                }
            });
            self.calls.borrow_mut().push(RecordedCommand { line, elevated });
            return Ok(out);
        }
        debug!(elevated, "record {}", line);
        let response = self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        self.calls.borrow_mut().push(RecordedCommand { line, elevated });
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_failure_becomes_command_failed() {
        let runner = RecordingRunner::new().respond("/usr/bin/kmutil", 71, "Error Domain=KMErrorDomain");
        let err = runner.root("/usr/bin/kmutil", &["install", "--update-all"]).unwrap_err();
        match err {
            PatchError::CommandFailed { command, code, output } => {
                assert_eq!(command, "/usr/bin/kmutil install --update-all");
                assert_eq!(code, 71);
                assert!(output.contains("KMErrorDomain"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(runner.calls()[0].elevated);
    }

    #[test]
    fn unmatched_commands_succeed_and_are_recorded() {
        let runner = RecordingRunner::new();
        runner.run("/bin/ls", &["/"], false).unwrap();
        assert_eq!(runner.lines(), vec!["/bin/ls /".to_string()]);
        assert!(runner.ran("/bin/ls"));
        assert!(!runner.calls()[0].elevated);
    }

    #[test]
    fn live_prefix_only_applies_unelevated() {
        let runner = RecordingRunner::new().live("/bin/echo");
        let out = runner.run("/bin/echo", &["probe"], false).unwrap();
        assert_eq!(out.output.trim(), "probe");
        let out = runner.run("/bin/echo", &["probe"], true).unwrap();
        assert!(out.output.is_empty());
        assert_eq!(runner.lines().len(), 2);
    }
}
