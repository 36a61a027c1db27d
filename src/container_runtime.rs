// Runtime Provider (spec.md §4.11): a `bollard`-backed `RuntimeProvider`
// enforcing the default-deny `SecuritySpec` on every container it runs.
// No teacher or pack file touches a container engine, so this is the "pick
// another real crate" fallback (see DESIGN.md) rather than an adaptation of
// existing code; its shape otherwise follows the capability-wrapper idiom
// every other adapter in this crate uses — thin pass-through methods that
// translate `contracts::runtime` types to and from the backend's own.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use futures::stream::StreamExt;
use tracing::{instrument, warn};

use crate::contracts::runtime::{ContainerSpec, ContainerState, PullOptions, RuntimeProvider, SecuritySpec};
use crate::errors::{ConduitError, Result};

pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ConduitError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    fn host_config(security: &SecuritySpec, mounts: &[(String, String)]) -> HostConfig {
        let binds = (!mounts.is_empty())
            .then(|| mounts.iter().map(|(host, container)| format!("{host}:{container}")).collect());

        let mut security_opt = Vec::new();
        if security.no_new_privileges {
            security_opt.push("no-new-privileges".to_string());
        }

        HostConfig {
            binds,
            readonly_rootfs: Some(security.read_only_rootfs),
            cap_drop: security.drop_all_capabilities.then(|| vec!["ALL".to_string()]),
            security_opt: (!security_opt.is_empty()).then_some(security_opt),
            network_mode: (!security.network_enabled).then(|| "none".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RuntimeProvider for BollardRuntime {
    #[instrument(skip(self))]
    async fn available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    #[instrument(skip(self))]
    async fn pull(&self, image: &str, opts: PullOptions) -> Result<()> {
        if !opts.force {
            if let Ok(existing) = self.docker.inspect_image(image).await {
                if existing.id.is_some() {
                    return Ok(());
                }
            }
        }

        let options = CreateImageOptions { from_image: image, ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            if let Err(err) = progress {
                return Err(ConduitError::RuntimeUnavailable(format!("pulling {image}: {err}")));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, spec), fields(image = %spec.image, name = %spec.name))]
    async fn run(&self, spec: ContainerSpec) -> Result<String> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let host_config = Self::host_config(&spec.security, &spec.mounts);

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions { name: spec.name.clone(), platform: None };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ConduitError::ContainerFailed(format!("create {}: {e}", spec.name)))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ConduitError::ContainerFailed(format!("start {}: {e}", created.id)))?;

        Ok(created.id)
    }

    #[instrument(skip(self))]
    async fn stop(&self, container_id: &str, timeout_secs: u64) -> Result<()> {
        let options = StopContainerOptions { t: timeout_secs as i64 };
        self.docker
            .stop_container(container_id, Some(options))
            .await
            .map_err(|e| ConduitError::ContainerFailed(format!("stop {container_id}: {e}")))
    }

    #[instrument(skip(self))]
    async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions { force, ..Default::default() };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(ConduitError::ContainerFailed(format!("remove {container_id}: {e}"))),
        }
    }

    #[instrument(skip(self))]
    async fn status(&self, container_id: &str) -> Result<ContainerState> {
        let inspect = match self.docker.inspect_container(container_id, None).await {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                return Err(ConduitError::ContainerNotFound(container_id.to_string()));
            }
            Err(e) => return Err(ConduitError::RuntimeUnavailable(e.to_string())),
        };

        let status = inspect.state.as_ref().and_then(|s| s.status);
        Ok(match status {
            Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
            Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
            _ => {
                warn!(container_id, ?status, "container in an unexpected state");
                ContainerState::Unknown
            }
        })
    }
}
