// ABOUTME: Fetches every image a release needs and prepares the stack network.
// ABOUTME: All-or-nothing: the first failed pull aborts before any container changes.

use super::error::DeployError;
use super::log::SessionLog;
use super::plan::ReleasePlan;
use crate::runtime::{ImageOps, NetworkConfig, NetworkError, NetworkOps, labels};
use crate::types::{ImageRef, NetworkId};
use std::collections::HashMap;

const STEP: &str = "provision";

pub struct ImageProvisioner<'a, R: ImageOps + NetworkOps> {
    runtime: &'a R,
    plan: &'a ReleasePlan,
    log: &'a SessionLog,
}

impl<'a, R: ImageOps + NetworkOps> ImageProvisioner<'a, R> {
    pub fn new(runtime: &'a R, plan: &'a ReleasePlan, log: &'a SessionLog) -> Self {
        Self { runtime, plan, log }
    }

    /// Pull the primary image and every declared artifact.
    pub async fn provision(&self) -> Result<Vec<ImageRef>, DeployError> {
        let images = self.plan.images();

        for image in &images {
            self.log.info(STEP, format!("pulling {image}"));
            self.runtime
                .pull_image(image)
                .await
                .map_err(|e| DeployError::Provision {
                    image: image.to_string(),
                    message: e.to_string(),
                })?;
        }
        self.log
            .info(STEP, format!("{} image(s) available", images.len()));

        let network = self.ensure_network().await?;
        self.log.debug(STEP, format!("network {network} ready"));
        Ok(images)
    }

    /// Create the stack network unless it already exists.
    pub async fn ensure_network(&self) -> Result<NetworkId, DeployError> {
        let name = self.plan.manifest.network_name();

        if self.runtime.network_exists(&name).await.unwrap_or(false) {
            return Ok(NetworkId::new(name));
        }

        let config = NetworkConfig {
            name: name.clone(),
            driver: Some("bridge".to_string()),
            labels: HashMap::from([
                (labels::MANAGED.to_string(), "true".to_string()),
                (labels::STACK.to_string(), self.plan.manifest.stack.to_string()),
            ]),
        };

        match self.runtime.create_network(&config).await {
            Ok(_) => {
                self.log.info(STEP, format!("created network {name}"));
                Ok(NetworkId::new(name))
            }
            // Created between the check and the create.
            Err(NetworkError::AlreadyExists(_)) => Ok(NetworkId::new(name)),
            Err(e) => Err(DeployError::Provision {
                image: name,
                message: e.to_string(),
            }),
        }
    }
}
