use log::{info, warn};
use thiserror::Error;
use crate::config::runtime::{Config, Credentials};
use crate::docker::{self, BuildParams, Docker};
use crate::payload;
use crate::version::ReleaseVersions;

pub const ARG_FRAMEWORK_PATH: &str = "FRAPPE_PATH";
pub const ARG_FRAMEWORK_BRANCH: &str = "FRAPPE_BRANCH";
pub const ARG_UPSTREAM_VERSION: &str = "ERPNEXT_VERSION";
pub const ARG_APPS_JSON: &str = "APPS_JSON_BASE64";

#[derive(Error, Debug)]
pub enum Error {
    #[error("app list: {0}")]
    Payload(#[from] payload::Error),

    #[error(transparent)]
    Docker(#[from] docker::Error),
}

/// Everything needed to build one release and publish it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub build: BuildParams,
    pub registry: String,
    /// Full image references pushed to the registry, in push order.
    pub registry_tags: Vec<String>,
    pub credentials: Option<Credentials>,
}

impl Plan {
    pub fn new(cfg: &Config, versions: &ReleaseVersions, apps_base64: String) -> Self {
        let image = &cfg.registry.image;
        Self {
            build: BuildParams {
                containerfile: cfg.build.containerfile.clone(),
                context: cfg.build.context.clone(),
                tag: format!("{}:{}", cfg.build.local_image, versions.image_version),
                build_args: vec![
                    (ARG_FRAMEWORK_PATH.into(), cfg.build.framework_path.clone()),
                    (ARG_FRAMEWORK_BRANCH.into(), versions.branch.clone()),
                    (ARG_UPSTREAM_VERSION.into(), versions.tag.clone()),
                    (ARG_APPS_JSON.into(), apps_base64),
                ],
            },
            registry: cfg.registry.server.clone(),
            registry_tags: vec![
                format!("{image}:{}", versions.image_version),
                format!("{image}:{}", versions.branch),
            ],
            credentials: cfg.credentials.clone(),
        }
    }

    /// Local tags created by [publish], removed again during cleanup.
    pub fn local_images(&self) -> Vec<String> {
        let mut images = vec![self.build.tag.clone()];
        images.extend(self.registry_tags.iter().cloned());
        images
    }
}

/// Read the app list and prepare the plan for `versions`.
pub fn prepare(cfg: &Config, versions: &ReleaseVersions) -> Result<Plan, Error> {
    let apps = payload::apps_json_base64(&cfg.build.apps_json)?;
    Ok(Plan::new(cfg, versions, apps))
}

/// Build, tag and push the image described by `plan`.
///
/// Stops at the first failing step. Local images are removed afterwards
/// whether or not the build succeeded.
pub fn publish(docker: &Docker, plan: &Plan) -> Result<(), Error> {
    let logged_in = match &plan.credentials {
        Some(credentials) => {
            docker.login(&plan.registry, &credentials.username, &credentials.token)?;
            true
        }
        None => {
            info!("No registry credentials in environment, using existing docker login");
            false
        }
    };

    let result = build_and_push(docker, plan);

    cleanup(docker, plan);
    if logged_in {
        if let Err(err) = docker.logout(&plan.registry) {
            warn!("{err}");
        }
    }

    result.map_err(Error::from)
}

fn build_and_push(docker: &Docker, plan: &Plan) -> Result<(), docker::Error> {
    docker.build(&plan.build)?;
    info!("Built {}", plan.build.tag);

    for target in &plan.registry_tags {
        docker.tag(&plan.build.tag, target)?;
        docker.push(target)?;
        info!("Pushed {target}");
    }
    Ok(())
}

fn cleanup(docker: &Docker, plan: &Plan) {
    if let Err(err) = docker.remove(&plan.local_images()) {
        warn!("cleanup: {err}");
    }
}
