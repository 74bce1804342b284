//! Custom ERPNext image builder
use std::io::Write;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{debug, error, info};
use thiserror::Error;
use crate::config::runtime::Config;
use crate::docker::Docker;
use crate::git::Git;
use crate::process::{DryRun, Executor, System};
use crate::version::{Derivation, Filter, ReleaseVersions};

mod config;
mod docker;
mod git;
mod payload;
mod pipeline;
mod process;
mod regenerate;
mod release;
mod version;

/// Build and publish a custom ERPNext image for an upstream release.
#[derive(Parser, Debug)]
#[command(name = "fb", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to ./fb.toml when it exists.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log docker and git commands instead of running them, and leave files untouched.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct VersionArg {
    /// Release to use: a major version (15), a full version (v15.2.3),
    /// or nothing for the most recent release.
    version: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Select a release and print the upstream tag, branch and image version.
    Tags {
        #[command(flatten)]
        version: VersionArg,

        /// Also append the values to the file named by $GITHUB_OUTPUT.
        #[arg(long)]
        github_output: bool,
    },
    /// Build the image for a release and push it to the registry.
    Build {
        #[command(flatten)]
        version: VersionArg,
    },
    /// Point the environment defaults and compose files at a release.
    Update {
        #[command(flatten)]
        version: VersionArg,

        /// Commit the regenerated files when they changed.
        #[arg(long)]
        commit: bool,

        /// Push the commit. Implies `--commit`.
        #[arg(long)]
        push: bool,
    },
    /// Build and push, then update and commit the tracked files.
    Ci {
        #[command(flatten)]
        version: VersionArg,

        /// Push the commit.
        #[arg(long)]
        push: bool,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file: {0}")]
    ConfigParse(#[from] config::file::Error),

    #[error("configuration: {0}")]
    Config(#[from] config::runtime::Error),

    #[error("version: {0}")]
    Version(#[from] version::Error),

    #[error("release: {0}")]
    Release(#[from] release::Error),

    #[error("build: {0}")]
    Pipeline(#[from] pipeline::Error),

    #[error("regenerate: {0}")]
    Regenerate(#[from] regenerate::Error),

    #[error("git: {0}")]
    Git(#[from] git::Error),

    #[error("--github-output requires GITHUB_OUTPUT to be set")]
    GithubOutputUnset,

    #[error("write {path}: {err}")]
    GithubOutput {
        err: std::io::Error,
        path: String,
    },
}

/// Read configuration file from disk and merge it with the
/// `default.toml` built-in config.
///
/// If a configuration file name is not set explicitly, this function will
/// detect whether a config file with the default file name exists on disk.
/// If it does, it is used implicitly.
fn read_config(args: &Cli) -> Result<config::file::File, Error> {
    const DEFAULT_CONFIG_FILE: &str = "fb.toml";

    let config_file = match &args.config {
        None => std::fs::metadata(DEFAULT_CONFIG_FILE)
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
            .then(|| DEFAULT_CONFIG_FILE.to_string()),
        Some(c) => Some(c.clone()),
    };

    Ok(if let Some(config_file) = config_file {
        debug!("Reading configuration from {config_file}");
        config::file::File::default_with_user_config_file(&config_file)?
    } else {
        config::file::File::default()
    })
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err.to_string());
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    let version_arg = match &args.command {
        Commands::Tags { version, .. }
        | Commands::Build { version }
        | Commands::Update { version, .. }
        | Commands::Ci { version, .. } => version.version.as_deref(),
    };
    let filter = Filter::from_arg(version_arg)?;

    let cfg = Config::from_env(read_config(&args)?)?;
    let executor: Box<dyn Executor> = if args.dry_run {
        Box::new(DryRun)
    } else {
        Box::new(System)
    };

    let Some(versions) = resolve(&cfg, &filter).await? else {
        return Ok(());
    };

    match args.command {
        Commands::Tags { github_output, .. } => {
            let lines = output_lines(&versions);
            print!("{lines}");
            if github_output {
                append_github_output(&lines)?;
            }
            Ok(())
        }
        Commands::Build { .. } => build(&cfg, executor.as_ref(), &versions),
        Commands::Update { commit, push, .. } => {
            update(&cfg, executor.as_ref(), &versions, args.dry_run, commit || push, push)
        }
        Commands::Ci { push, .. } => {
            build(&cfg, executor.as_ref(), &versions)?;
            update(&cfg, executor.as_ref(), &versions, args.dry_run, true, push)
        }
    }
}

/// Find the release selected by `filter` and derive its versions.
///
/// Returns `None` when the release belongs to a major version we do not build.
async fn resolve(cfg: &Config, filter: &Filter) -> Result<Option<ReleaseVersions>, Error> {
    let source = release::Source {
        api_url: cfg.upstream.api_url.clone(),
        repository: cfg.upstream.repository.clone(),
        token: cfg.github_token.clone(),
        timeout: cfg.timeout(),
    };
    let release = release::find(&source, filter).await?;

    match version::derive(&release.tag_name, cfg.upstream.supported_major)? {
        Derivation::Supported(versions) => {
            info!(
                "Release {}: branch {}, image version {}",
                versions.tag, versions.branch, versions.image_version
            );
            Ok(Some(versions))
        }
        Derivation::Unsupported { tag, major } => {
            info!(
                "Release {tag} is major version {major}, only {} is built; nothing to do",
                cfg.upstream.supported_major
            );
            Ok(None)
        }
    }
}

fn build(cfg: &Config, executor: &dyn Executor, versions: &ReleaseVersions) -> Result<(), Error> {
    let plan = pipeline::prepare(cfg, versions)?;
    let docker = Docker::new(executor, &cfg.tools.docker);
    pipeline::publish(&docker, &plan)?;
    info!("Published {}", plan.registry_tags.join(", "));
    Ok(())
}

fn update(
    cfg: &Config,
    executor: &dyn Executor,
    versions: &ReleaseVersions,
    dry_run: bool,
    commit: bool,
    push: bool,
) -> Result<(), Error> {
    regenerate::regenerate(&cfg.files, versions, dry_run)?;
    if !commit {
        return Ok(());
    }

    let git = Git::new(executor, &cfg.tools.git);
    let paths = vec![cfg.files.env_file.clone(), cfg.files.compose_file.clone()];
    let message = cfg.git.commit_message.replace("{tag}", &versions.tag);
    let remote = push.then_some(cfg.git.remote.as_str());
    git::commit_if_changed(&git, &paths, &message, remote)?;
    Ok(())
}

fn output_lines(versions: &ReleaseVersions) -> String {
    format!(
        "tag={}\nbranch={}\nimage_version={}\n",
        versions.tag, versions.branch, versions.image_version
    )
}

fn append_github_output(lines: &str) -> Result<(), Error> {
    let path = std::env::var("GITHUB_OUTPUT").map_err(|_| Error::GithubOutputUnset)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(lines.as_bytes()))
        .map_err(|err| Error::GithubOutput { err, path })
}
