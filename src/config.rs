// Daemon configuration (ambient stack: layered defaults -> TOML file ->
// environment overrides via the `config` crate, matching the teacher's
// `mcp/config.rs` field groupings but wired through `config::Config`
// instead of the teacher's hand-rolled `std::env::var` overrides, since the
// teacher already carries `config` as a dependency for this purpose).
//
// Parsing a config *file* is an external collaborator's job (spec.md's
// config-file-parsing Non-goal); this module only defines the typed struct
// every subsystem consumes and the convenience loader the binaries use.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::errors::{ConduitError, Result};
use crate::policy::PolicyConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub socket_path: Option<PathBuf>,
    pub http_addr: Option<String>,
    pub worker_threads: usize,
    pub backends: BackendToggles,
    pub policy: PolicyConfig,
    pub log_level: String,
}

/// Which optional backends the daemon should attempt to wire up at startup.
/// A toggle that's on but whose backend fails its own availability probe
/// still starts the daemon in a degraded mode (spec.md §4.13); these flags
/// only control whether the attempt is made at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToggles {
    pub vector: bool,
    pub graph: bool,
    pub runtime: bool,
}

impl Default for BackendToggles {
    fn default() -> Self {
        Self { vector: true, graph: true, runtime: true }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./conduit-data"),
            socket_path: None,
            http_addr: None,
            worker_threads: 4,
            backends: BackendToggles::default(),
            policy: PolicyConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl DaemonConfig {
    /// The Unix socket path the kernel binds, defaulting to a well-known
    /// name under `data_dir` when not set explicitly.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(|| self.data_dir.join("conduit.sock"))
    }

    /// Load from an optional TOML file layered under defaults, then
    /// `CONDUIT__*` environment variables (double underscore separates
    /// nested fields, e.g. `CONDUIT__BACKENDS__VECTOR=false`).
    pub fn from_file(path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("CONDUIT").separator("__"));

        builder.build().map_err(config_err)?.try_deserialize().map_err(config_err)
    }
}

fn config_err(e: config::ConfigError) -> ConduitError {
    ConduitError::ConfigInvalid(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_sane_socket_path() {
        let config = DaemonConfig::default();
        assert_eq!(config.socket_path(), config.data_dir.join("conduit.sock"));
    }

    #[test]
    fn explicit_socket_path_overrides_the_default() {
        let mut config = DaemonConfig::default();
        config.socket_path = Some(PathBuf::from("/tmp/custom.sock"));
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn from_file_with_no_path_falls_back_to_defaults() {
        let config = DaemonConfig::from_file(None).unwrap();
        assert_eq!(config.worker_threads, 4);
        assert!(config.backends.vector);
    }

    #[test]
    fn from_file_reads_a_toml_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, "worker_threads = 8\nlog_level = \"debug\"\n").unwrap();

        let config = DaemonConfig::from_file(Some(&path)).unwrap();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn environment_override_takes_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, "worker_threads = 8\n").unwrap();

        std::env::set_var("CONDUIT__WORKER_THREADS", "16");
        let config = DaemonConfig::from_file(Some(&path)).unwrap();
        std::env::remove_var("CONDUIT__WORKER_THREADS");

        assert_eq!(config.worker_threads, 16);
    }
}
