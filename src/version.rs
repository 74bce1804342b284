use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("release tag '{0}' does not look like v<major>.<minor>.<patch>[-<suffix>]")]
    TagShape(String),

    #[error("version filter '{0}' must be a major version (15), or a full version (v15.2.3)")]
    FilterShape(String),
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"^v(?P<major>\d+)\.\d+\.\d+(?:-[0-9A-Za-z][0-9A-Za-z.-]*)?$")
            .expect("tag regex is valid")
    })
}

/// Which release to pick from the upstream release list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// The most recent release.
    Latest,
    /// The most recent release within a major version.
    Major(u64),
    /// A specific release. Always carries the leading `v`.
    Exact(String),
}

impl Filter {
    /// Parse an optional command line argument into a filter.
    pub fn from_arg(arg: Option<&str>) -> Result<Self, Error> {
        match arg {
            None => Ok(Filter::Latest),
            Some(s) => s.parse(),
        }
    }

    /// Whether `tag` is selected by this filter.
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Filter::Latest => true,
            Filter::Major(major) => tag.starts_with(&format!("v{major}.")),
            Filter::Exact(exact) => match tag.strip_prefix(exact.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('-'),
                None => false,
            },
        }
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

        if !bare.is_empty() && bare.chars().all(|c| c.is_ascii_digit()) {
            return bare
                .parse()
                .map(Filter::Major)
                .map_err(|_| Error::FilterShape(s.to_string()));
        }

        let tagged = format!("v{bare}");
        if tag_regex().is_match(&tagged) {
            Ok(Filter::Exact(tagged))
        } else {
            Err(Error::FilterShape(s.to_string()))
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Latest => f.write_str("latest"),
            Filter::Major(major) => write!(f, "v{major}.x"),
            Filter::Exact(exact) => f.write_str(exact),
        }
    }
}

/// The three strings derived from one upstream release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersions {
    /// Upstream tag, unchanged, e.g. `v15.2.3`.
    pub tag: String,
    /// Source branch of the framework, e.g. `version-15`.
    pub branch: String,
    /// Tag used for the built image, e.g. `15.2.3`.
    pub image_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    Supported(ReleaseVersions),
    /// The tag is well-formed but belongs to a major version we do not build.
    Unsupported { tag: String, major: String },
}

/// Derive the tag, branch name and image version from a release tag.
pub fn derive(tag: &str, supported_major: u64) -> Result<Derivation, Error> {
    let captures = tag_regex()
        .captures(tag)
        .ok_or_else(|| Error::TagShape(tag.to_string()))?;
    // A major too large for u64 is still well-formed, just not ours.
    let major = &captures["major"];
    if major.parse::<u64>().ok() != Some(supported_major) {
        return Ok(Derivation::Unsupported {
            tag: tag.to_string(),
            major: major.to_string(),
        });
    }

    Ok(Derivation::Supported(ReleaseVersions {
        tag: tag.to_string(),
        branch: format!("version-{supported_major}"),
        image_version: tag[1..].to_string(),
    }))
}
