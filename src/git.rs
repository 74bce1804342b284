use log::{debug, info};
use thiserror::Error;
use crate::process::{Executor, Status};

#[derive(Error, Debug)]
pub enum Error {
    #[error("git {command} failed with exit code {status}")]
    Command { command: &'static str, status: Status },

    #[error("run git: {0}")]
    IOError(#[from] std::io::Error),
}

/// Thin wrapper around the git CLI, operating on the current directory.
pub struct Git<'a> {
    executor: &'a dyn Executor,
    program: &'a str,
}

impl<'a> Git<'a> {
    pub fn new(executor: &'a dyn Executor, program: &'a str) -> Self {
        Self { executor, program }
    }

    fn run(&self, command: &'static str, rest: &[String]) -> Result<(), Error> {
        let mut args = vec![command.to_string()];
        args.extend(rest.iter().cloned());
        match self.executor.status(self.program, &args)? {
            status if status.success() => Ok(()),
            status => Err(Error::Command { command, status }),
        }
    }

    /// Whether any of `paths` differ from what is committed.
    pub fn is_dirty(&self, paths: &[String]) -> Result<bool, Error> {
        let mut args = vec!["status".to_string(), "--porcelain".to_string(), "--".to_string()];
        args.extend(paths.iter().cloned());
        let (status, stdout) = self.executor.output(self.program, &args)?;
        if !status.success() {
            return Err(Error::Command { command: "status", status });
        }
        debug!("git status: {:?}", stdout.trim());
        Ok(!stdout.trim().is_empty())
    }

    pub fn add(&self, paths: &[String]) -> Result<(), Error> {
        let mut args = vec!["--".to_string()];
        args.extend(paths.iter().cloned());
        self.run("add", &args)
    }

    pub fn commit(&self, message: &str, paths: &[String]) -> Result<(), Error> {
        let mut args = vec!["--message".to_string(), message.to_string(), "--".to_string()];
        args.extend(paths.iter().cloned());
        self.run("commit", &args)
    }

    pub fn push(&self, remote: &str) -> Result<(), Error> {
        self.run("push", &[remote.to_string(), "HEAD".to_string()])
    }
}

/// Commit `paths` if they have uncommitted changes, optionally pushing afterwards.
///
/// Returns whether a commit was made.
pub fn commit_if_changed(
    git: &Git,
    paths: &[String],
    message: &str,
    push_to: Option<&str>,
) -> Result<bool, Error> {
    if !git.is_dirty(paths)? {
        info!("Nothing to commit");
        return Ok(false);
    }

    git.add(paths)?;
    git.commit(message, paths)?;
    info!("Committed: {message}");

    if let Some(remote) = push_to {
        git.push(remote)?;
        info!("Pushed to {remote}");
    }
    Ok(true)
}
