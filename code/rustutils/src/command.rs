// Execute a report command through the shell and capture everything it says.
//
// There is no timeout: a hung scheduler command blocks its caller.  Output is
// drained while the child runs (communicate does that for us), otherwise a chatty command would
// fill the pipe and stop.

use anyhow::{bail, Result};
use log::debug;
use subprocess::{Exec, ExitStatus, Redirection};

#[derive(Debug, Default, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// The scheduler occasionally emits non-UTF8 bytes in job names and commands; those are
    /// replaced rather than rejected.

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Anything that can run a command line and hand back its output.  The sampler is written against
/// this so that canned scheduler output can stand in for a live cluster.

pub trait CommandRunner: Sync {
    fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// The real thing: `sh -c <command>`.

pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        run_command(command)
    }
}

pub fn run_command(command: &str) -> Result<CommandOutput> {
    debug!("Running '{command}'");
    let mut p = match Exec::shell(command)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .popen()
    {
        Ok(p) => p,
        Err(e) => {
            bail!("Could not start '{command}': {e}");
        }
    };

    let (stdout, stderr) = p.communicate_bytes(None)?;
    let status = match p.wait()? {
        ExitStatus::Exited(code) => code as i32,
        ExitStatus::Signaled(signal) => 128 + signal as i32,
        ExitStatus::Other(code) => code,
        ExitStatus::Undetermined => -1,
    };

    debug!("'{command}' exited with {status}");
    Ok(CommandOutput {
        status,
        stdout: stdout.unwrap_or_default(),
        stderr: stderr.unwrap_or_default(),
    })
}

#[test]
fn test_run_command() {
    let out = run_command("echo hello; echo oops 1>&2").unwrap();
    assert!(out.success());
    assert!(out.stdout_text() == "hello\n");
    assert!(out.stderr_text() == "oops\n");

    let out = run_command("exit 3").unwrap();
    assert!(!out.success());
    assert!(out.status == 3);
}
