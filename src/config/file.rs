use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../default.toml");

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    Read {
        err: std::io::Error,
        path: String,
    },

    #[error("parse {path}: {err}")]
    Parse {
        err: toml::de::Error,
        path: String,
    },
}

/// A fb.toml file.
#[derive(Deserialize, Debug)]
pub struct File {
    pub description: Option<String>,
    pub upstream: Upstream,
    pub build: Build,
    pub registry: Registry,
    pub files: Files,
    #[serde(default = "Default::default")]
    pub git: Git,
    pub tools: Tools,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

impl File {
    /// Parse a user configuration, layered on top of the built-in defaults.
    ///
    /// Tables are merged key by key, so a user file only needs to contain
    /// the values it overrides.
    pub fn default_with_user_config(user_config: &str, path: &str) -> Result<Self, Error> {
        let parse_err = |err| Error::Parse { err, path: path.to_string() };

        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG).map_err(parse_err)?;
        let user: toml::Table = toml::from_str(user_config).map_err(parse_err)?;
        merge(&mut merged, user);

        toml::Value::Table(merged).try_into().map_err(parse_err)
    }

    pub fn default_with_user_config_file(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|err| Error::Read {
            err,
            path: path.to_string(),
        })?;
        Self::default_with_user_config(&contents, path)
    }
}

fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge(base_table, overlay_table)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Where releases are published.
#[derive(Deserialize, Debug, Clone)]
pub struct Upstream {
    pub api_url: String,
    /// GitHub `owner/name`.
    pub repository: String,
    pub supported_major: u64,
    pub timeout_seconds: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Build {
    pub containerfile: String,
    pub context: String,
    /// JSON list of apps baked into the image.
    pub apps_json: String,
    /// Git URL of the framework repository cloned during the build.
    pub framework_path: String,
    /// Name the freshly built image is tagged with before it gets registry tags.
    pub local_image: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Registry {
    pub server: String,
    pub image: String,
}

/// Tracked repository files regenerated for every release.
#[derive(Deserialize, Debug, Clone)]
pub struct Files {
    pub env_file: String,
    pub env_key: String,
    pub compose_file: String,
    pub compose_image: String,
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Git {
    /// `{tag}` is replaced with the upstream release tag.
    #[serde_inline_default("chore: bump image to {tag}".to_string())]
    pub commit_message: String,
    #[serde_inline_default("origin".to_string())]
    pub remote: String,
}

impl Default for Git {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Tools {
    pub docker: String,
    pub git: String,
}
