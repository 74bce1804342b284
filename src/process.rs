use std::fmt::{Display, Formatter};
use std::io::Write;
use std::process::{Command, Stdio};
use log::{debug, info};

/// Exit status of a finished subprocess.
/// `None` means the process was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub Option<i32>);

impl Status {
    pub const SUCCESS: Status = Status(Some(0));

    pub fn success(&self) -> bool {
        self.0 == Some(0)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("(terminated by signal)"),
        }
    }
}

impl From<std::process::ExitStatus> for Status {
    fn from(value: std::process::ExitStatus) -> Self {
        Self(value.code())
    }
}

/// Runs external programs such as `docker` and `git`.
#[cfg_attr(test, mockall::automock)]
pub trait Executor {
    /// Run a program with inherited stdout/stderr.
    fn status(&self, program: &str, args: &[String]) -> std::io::Result<Status>;

    /// Like [Executor::status], with `stdin` piped into the program.
    fn status_with_stdin(&self, program: &str, args: &[String], stdin: &[u8]) -> std::io::Result<Status>;

    /// Run a program and capture its standard output.
    fn output(&self, program: &str, args: &[String]) -> std::io::Result<(Status, String)>;
}

/// Executes commands on the host.
pub struct System;

impl Executor for System {
    fn status(&self, program: &str, args: &[String]) -> std::io::Result<Status> {
        debug!("exec: {} {}", program, args.join(" "));
        Command::new(program)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map(Status::from)
    }

    fn status_with_stdin(&self, program: &str, args: &[String], stdin: &[u8]) -> std::io::Result<Status> {
        debug!("exec: {} {} < (stdin)", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin)?;
            // pipe is dropped here so the child sees EOF
        }
        Ok(child.wait()?.into())
    }

    fn output(&self, program: &str, args: &[String]) -> std::io::Result<(Status, String)> {
        debug!("exec: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?;
        Ok((
            output.status.into(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

/// Prints commands instead of executing them.
///
/// Commands that capture output report an empty, successful result.
pub struct DryRun;

impl Executor for DryRun {
    fn status(&self, program: &str, args: &[String]) -> std::io::Result<Status> {
        info!("dry-run: {} {}", program, args.join(" "));
        Ok(Status::SUCCESS)
    }

    fn status_with_stdin(&self, program: &str, args: &[String], _stdin: &[u8]) -> std::io::Result<Status> {
        info!("dry-run: {} {} < (stdin)", program, args.join(" "));
        Ok(Status::SUCCESS)
    }

    fn output(&self, program: &str, args: &[String]) -> std::io::Result<(Status, String)> {
        info!("dry-run: {} {}", program, args.join(" "));
        Ok((Status::SUCCESS, String::new()))
    }
}

#[cfg(test)]
pub fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
