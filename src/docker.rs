use log::debug;
use thiserror::Error;
use crate::process::{Executor, Status};

#[derive(Error, Debug)]
pub enum Error {
    #[error("docker build failed with exit code {0}")]
    Build(Status),

    #[error("docker tag {target} failed with exit code {status}")]
    Tag { target: String, status: Status },

    #[error("docker login failed with exit code {0}")]
    Login(Status),

    #[error("docker logout failed with exit code {0}")]
    Logout(Status),

    #[error("docker push {image} failed with exit code {status}")]
    Push { image: String, status: Status },

    #[error("docker image rm failed with exit code {0}")]
    Remove(Status),

    #[error("run docker: {0}")]
    IOError(#[from] std::io::Error),
}

/// Parameters for `docker build`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub containerfile: String,
    pub context: String,
    pub tag: String,
    /// Ordered `--build-arg` key/value pairs.
    pub build_args: Vec<(String, String)>,
}

/// Thin wrapper around the Docker CLI.
pub struct Docker<'a> {
    executor: &'a dyn Executor,
    program: &'a str,
}

impl<'a> Docker<'a> {
    pub fn new(executor: &'a dyn Executor, program: &'a str) -> Self {
        Self { executor, program }
    }

    fn run(&self, args: Vec<String>) -> Result<Status, Error> {
        Ok(self.executor.status(self.program, &args)?)
    }

    pub fn build(&self, params: &BuildParams) -> Result<(), Error> {
        debug!("Building image {}", params.tag);
        let mut args = vec![
            "build".to_string(),
            "--file".to_string(),
            params.containerfile.clone(),
            "--tag".to_string(),
            params.tag.clone(),
        ];
        for (key, value) in &params.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(params.context.clone());

        match self.run(args)? {
            status if status.success() => Ok(()),
            status => Err(Error::Build(status)),
        }
    }

    pub fn tag(&self, source: &str, target: &str) -> Result<(), Error> {
        debug!("Tagging {source} as {target}");
        match self.run(vec!["tag".into(), source.into(), target.into()])? {
            status if status.success() => Ok(()),
            status => Err(Error::Tag { target: target.to_string(), status }),
        }
    }

    pub fn push(&self, image: &str) -> Result<(), Error> {
        debug!("Pushing image {image}");
        match self.run(vec!["push".into(), image.into()])? {
            status if status.success() => Ok(()),
            status => Err(Error::Push { image: image.to_string(), status }),
        }
    }

    pub fn login(&self, registry: &str, username: &str, token: &str) -> Result<(), Error> {
        debug!("Logging in to Docker registry {registry} as {username}");
        let args = vec![
            "login".to_string(),
            "--username".to_string(),
            username.to_string(),
            "--password-stdin".to_string(),
            registry.to_string(),
        ];
        match self.executor.status_with_stdin(self.program, &args, token.as_bytes())? {
            status if status.success() => Ok(()),
            status => Err(Error::Login(status)),
        }
    }

    pub fn logout(&self, registry: &str) -> Result<(), Error> {
        match self.run(vec!["logout".into(), registry.into()])? {
            status if status.success() => Ok(()),
            status => Err(Error::Logout(status)),
        }
    }

    /// Remove local image tags.
    pub fn remove(&self, images: &[String]) -> Result<(), Error> {
        if images.is_empty() {
            return Ok(());
        }
        let mut args = vec!["image".to_string(), "rm".to_string(), "--force".to_string()];
        args.extend(images.iter().cloned());
        match self.run(args)? {
            status if status.success() => Ok(()),
            status => Err(Error::Remove(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::process::{args, MockExecutor};
    use super::*;

    #[test]
    fn build_passes_args_in_order() {
        let expected = args([
            "build",
            "--file", "images/custom/Containerfile",
            "--tag", "local:15.2.3",
            "--build-arg", "A=1",
            "--build-arg", "B=x=y",
            ".",
        ]);
        let mut executor = MockExecutor::new();
        executor
            .expect_status()
            .withf(move |program, args| program == "docker" && args == expected.as_slice())
            .times(1)
            .returning(|_, _| Ok(Status::SUCCESS));

        let docker = Docker::new(&executor, "docker");
        docker
            .build(&BuildParams {
                containerfile: "images/custom/Containerfile".into(),
                context: ".".into(),
                tag: "local:15.2.3".into(),
                build_args: vec![("A".into(), "1".into()), ("B".into(), "x=y".into())],
            })
            .unwrap();
    }

    #[test]
    fn push_failure_carries_image_and_code() {
        let mut executor = MockExecutor::new();
        executor
            .expect_status()
            .returning(|_, _| Ok(Status(Some(1))));

        let err = Docker::new(&executor, "docker").push("acme/erp:15.2.3").unwrap_err();
        assert_eq!(err.to_string(), "docker push acme/erp:15.2.3 failed with exit code 1");
    }

    #[test]
    fn login_pipes_token() {
        let mut executor = MockExecutor::new();
        executor
            .expect_status_with_stdin()
            .withf(|program, args, stdin| {
                program == "docker"
                    && args == ["login", "--username", "builder", "--password-stdin", "docker.io"]
                    && stdin == b"t0ken"
            })
            .times(1)
            .returning(|_, _, _| Ok(Status::SUCCESS));

        Docker::new(&executor, "docker")
            .login("docker.io", "builder", "t0ken")
            .unwrap();
    }

    #[test]
    fn missing_binary_is_io_error() {
        let mut executor = MockExecutor::new();
        executor.expect_status().returning(|_, _| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        });

        let err = Docker::new(&executor, "docker").logout("docker.io").unwrap_err();
        assert!(matches!(err, Error::IOError(_)));
    }

    #[test]
    fn remove_nothing_runs_nothing() {
        let executor = MockExecutor::new();
        Docker::new(&executor, "docker").remove(&[]).unwrap();
    }
}
