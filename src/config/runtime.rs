use std::time::Duration;
use thiserror::Error;
use crate::config::file;

pub const ENV_REGISTRY_USERNAME: &str = "DOCKERHUB_USERNAME";
pub const ENV_REGISTRY_TOKEN: &str = "DOCKERHUB_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("{0} is set but {1} is not; set both or neither")]
    PartialCredentials(&'static str, &'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Registry login, read from the environment.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Everything a command needs, after merging the config file with the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: file::Upstream,
    pub build: file::Build,
    pub registry: file::Registry,
    pub files: file::Files,
    pub git: file::Git,
    pub tools: file::Tools,
    pub credentials: Option<Credentials>,
    pub github_token: Option<String>,
}

impl Config {
    pub fn new(file: file::File, env: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let non_empty = |key| env(key).filter(|v: &String| !v.is_empty());

        let credentials = match (non_empty(ENV_REGISTRY_USERNAME), non_empty(ENV_REGISTRY_TOKEN)) {
            (Some(username), Some(token)) => Some(Credentials { username, token }),
            (None, None) => None,
            (Some(_), None) => return Err(Error::PartialCredentials(ENV_REGISTRY_USERNAME, ENV_REGISTRY_TOKEN)),
            (None, Some(_)) => return Err(Error::PartialCredentials(ENV_REGISTRY_TOKEN, ENV_REGISTRY_USERNAME)),
        };

        if file.registry.image.is_empty() {
            return Err(Error::Empty("registry.image"));
        }
        if file.upstream.repository.is_empty() {
            return Err(Error::Empty("upstream.repository"));
        }

        Ok(Self {
            upstream: file.upstream,
            build: file.build,
            registry: file.registry,
            files: file.files,
            git: file.git,
            tools: file.tools,
            credentials,
            github_token: non_empty(ENV_GITHUB_TOKEN),
        })
    }

    pub fn from_env(file: file::File) -> Result<Self, Error> {
        Self::new(file, |key| std::env::var(key).ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::new(file::File::default(), |key| vars.get(key).cloned())
    }

    #[test]
    fn no_credentials() {
        let cfg = config_with(&[]).unwrap();
        assert_eq!(cfg.credentials, None);
        assert_eq!(cfg.github_token, None);
    }

    #[test]
    fn full_credentials() {
        let cfg = config_with(&[
            (ENV_REGISTRY_USERNAME, "builder"),
            (ENV_REGISTRY_TOKEN, "s3cr3t"),
            (ENV_GITHUB_TOKEN, "ghp_x"),
        ])
        .unwrap();
        let creds = cfg.credentials.unwrap();
        assert_eq!(creds.username, "builder");
        assert!(!format!("{creds:?}").contains("s3cr3t"));
        assert_eq!(cfg.github_token.as_deref(), Some("ghp_x"));
    }

    #[test]
    fn half_credentials_are_an_error() {
        assert_eq!(
            config_with(&[(ENV_REGISTRY_USERNAME, "builder")]).unwrap_err(),
            Error::PartialCredentials(ENV_REGISTRY_USERNAME, ENV_REGISTRY_TOKEN)
        );
        // empty counts as unset
        assert!(config_with(&[(ENV_REGISTRY_USERNAME, ""), (ENV_REGISTRY_TOKEN, "")])
            .unwrap()
            .credentials
            .is_none());
    }
}
