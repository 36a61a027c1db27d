//! Conduit daemon entrypoint. Loads `DaemonConfig`, wires up whichever
//! optional backends the config toggles on, and serves until a shutdown
//! signal arrives. No CLI flag parser: the daemon's surface is a single
//! optional config-file path argument plus `CONDUIT__*` environment
//! overrides (see `conduit::config`), matching spec.md's "configuration
//! file parsing is an external collaborator's job" stance.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use conduit::config::DaemonConfig;
use conduit::contracts::Store;
use conduit::kernel::{DaemonKernel, KernelBackends, KernelConfig};
use conduit::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DaemonConfig::from_file(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    fmt().with_env_filter(filter).with_target(false).init();

    tracing::info!(data_dir = %config.data_dir.display(), "starting conduit daemon");

    let store: Arc<dyn Store> = Arc::new(FileStore::open(config.data_dir.clone()).await?);
    let backends = build_backends(&config);

    let kernel = DaemonKernel::build(
        KernelConfig {
            socket_path: config.socket_path(),
            http_addr: config.http_addr.clone(),
            policy: config.policy.clone(),
        },
        store,
        backends,
    )
    .await?;

    let shutdown = kernel.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.notify_one();
        }
    });

    kernel.run().await?;
    Ok(())
}

fn build_backends(config: &DaemonConfig) -> KernelBackends {
    let mut backends = KernelBackends::default();

    if config.backends.vector {
        backends.vector_store = Some(Arc::new(conduit::vector_store::InProcessVectorStore::new()));
        backends.embedder = Some(Arc::new(conduit::embeddings::HashEmbeddingProvider::new(
            conduit::embeddings::EmbeddingConfig::default(),
        )));
    }

    if config.backends.graph {
        backends.graph_store = Some(Arc::new(conduit::graph_store::PetGraphStore::new()));
        backends.extractor = Some(Arc::new(conduit::extractor::NullExtractor));
    }

    #[cfg(feature = "container-runtime")]
    if config.backends.runtime {
        match conduit::container_runtime::BollardRuntime::connect() {
            Ok(runtime) => backends.runtime = Some(Arc::new(runtime)),
            Err(err) => tracing::warn!(error = %err, "container runtime unavailable, connector instances disabled"),
        }
    }

    backends
}
