use std::time::Duration;
use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;
use crate::version::Filter;

const USER_AGENT: &str = concat!("fb/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum Error {
    #[error("request releases: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("releases endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("releases response is not a list of releases: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("release list is empty")]
    Empty,

    #[error("no release matches {0}")]
    NoMatch(Filter),
}

/// A single entry from the GitHub releases listing.
/// Only the fields we use are decoded.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl Release {
    pub fn published(&self) -> Option<DateTime<FixedOffset>> {
        self.published_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    }
}

/// Location and credentials for the releases endpoint.
#[derive(Debug, Clone)]
pub struct Source {
    pub api_url: String,
    /// `owner/name`
    pub repository: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Source {
    pub fn url(&self) -> String {
        format!(
            "{}/repos/{}/releases",
            self.api_url.trim_end_matches('/'),
            self.repository
        )
    }
}

/// Fetch the first page of releases, most recent first.
pub async fn fetch(source: &Source) -> Result<Vec<Release>, Error> {
    let url = source.url();
    debug!("Fetching releases from {url}");

    let client = reqwest::Client::builder()
        .timeout(source.timeout)
        .user_agent(USER_AGENT)
        .build()?;

    let mut request = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28");
    if let Some(token) = &source.token {
        request = request.bearer_auth(token);
    }

    let resp = request.send().await?;
    let status = resp.status();
    let bytes = resp.bytes().await?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        return Err(Error::Status {
            code: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    parse(&bytes)
}

pub fn parse(bytes: &[u8]) -> Result<Vec<Release>, Error> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Pick the first release accepted by `filter`.
pub fn select<'a>(releases: &'a [Release], filter: &Filter) -> Result<&'a Release, Error> {
    if releases.is_empty() {
        return Err(Error::Empty);
    }
    releases
        .iter()
        .find(|release| filter.matches(&release.tag_name))
        .ok_or_else(|| Error::NoMatch(filter.clone()))
}

/// Fetch releases and return the one matching `filter`.
pub async fn find(source: &Source, filter: &Filter) -> Result<Release, Error> {
    let releases = fetch(source).await?;
    debug!("{} releases listed for {}", releases.len(), source.repository);

    let release = select(&releases, filter)?.clone();
    if let Some(url) = &release.html_url {
        debug!("Release notes: {url}");
    }
    match release.published() {
        Some(published) => info!(
            "Selected release {} ({}), published {}",
            release.tag_name,
            filter,
            published.format("%Y-%m-%d %H:%M UTC%:z")
        ),
        None => info!("Selected release {} ({})", release.tag_name, filter),
    }
    Ok(release)
}
