// Runtime Provider contract (spec.md §4.11).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Running,
    Exited,
    Unknown,
}

/// The default security spec enforced on `run` (spec.md §4.11): read-only
/// root filesystem, no-new-privileges, drop all capabilities, no network
/// unless requested.
#[derive(Debug, Clone)]
pub struct SecuritySpec {
    pub read_only_rootfs: bool,
    pub no_new_privileges: bool,
    pub drop_all_capabilities: bool,
    pub network_enabled: bool,
}

impl Default for SecuritySpec {
    fn default() -> Self {
        Self {
            read_only_rootfs: true,
            no_new_privileges: true,
            drop_all_capabilities: true,
            network_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub mounts: Vec<(String, String)>, // (host_path, container_path)
    pub security: SecuritySpec,
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub force: bool,
}

#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    async fn available(&self) -> bool;
    async fn pull(&self, image: &str, opts: PullOptions) -> Result<()>;
    async fn run(&self, spec: ContainerSpec) -> Result<String>;
    async fn stop(&self, container_id: &str, timeout_secs: u64) -> Result<()>;
    async fn remove(&self, container_id: &str, force: bool) -> Result<()>;
    async fn status(&self, container_id: &str) -> Result<ContainerState>;
}
