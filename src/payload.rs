use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("{path} is not valid JSON: {err}")]
    Json {
        err: serde_json::Error,
        path: String,
    },
}

/// Read the app list and encode it for use as a build argument.
///
/// The file must be valid JSON. Its bytes are encoded as-is.
pub fn apps_json_base64(path: &str) -> Result<String, Error> {
    let bytes = std::fs::read(path).map_err(|err| Error::ReadFile {
        err,
        path: path.to_string(),
    })?;
    encode(&bytes).map_err(|err| Error::Json {
        err,
        path: path.to_string(),
    })
}

fn encode(bytes: &[u8]) -> Result<String, serde_json::Error> {
    let apps: serde_json::Value = serde_json::from_slice(bytes)?;
    if let Some(list) = apps.as_array() {
        debug!("App list contains {} entries", list.len());
    }
    Ok(STANDARD.encode(bytes))
}
