// Daemon Kernel (spec.md §4.13): owns every subsystem handle and brings
// them up in the order the spec requires — Store, then Policy, then a probe
// of each optional backend, then Lifecycle reconciliation, then the Source
// Manager, and only then the listener. Shutdown reverses that order.
// Grounded on `http_server.rs`'s `create_server_with_*` constructors (explicit
// construction of a router over injected subsystem handles) and
// `connection_pool.rs`'s worker-pool-with-a-shutdown-signal shape, adapted
// here into a single `tokio::sync::Notify`-driven shutdown instead of a pool.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::serve::Listener;
use tokio::net::{unix::SocketAddr as UnixSocketAddr, UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::contracts::embedding::EmbeddingProvider;
use crate::contracts::extractor::Extractor;
use crate::contracts::graph::GraphStore;
use crate::contracts::runtime::RuntimeProvider;
use crate::contracts::vector::VectorStore;
use crate::contracts::Store;
use crate::errors::Result;
use crate::events::EventBus;
use crate::graph_query::GraphQueryEngine;
use crate::http_server::{self, AppState};
use crate::indexer::Indexer;
use crate::lifecycle::LifecycleManager;
use crate::policy::{PolicyConfig, PolicyEngine};
use crate::retrieval::RetrievalEngine;
use crate::source_manager::SourceManager;

const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// A `tokio::net::UnixListener` wrapped to satisfy `axum::serve::Listener`,
/// which the standard library type doesn't implement directly.
pub struct UnixSocketListener {
    inner: UnixListener,
}

impl Listener for UnixSocketListener {
    type Io = UnixStream;
    type Addr = UnixSocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok(pair) => return pair,
                Err(err) => {
                    warn!(error = %err, "unix socket accept failed, retrying");
                    continue;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Binds a Unix domain socket at `path`, removing a stale socket file left
/// behind by an unclean shutdown, and restricts it to owner read/write only.
fn bind_unix_socket(path: &Path) -> io::Result<UnixSocketListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let inner = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(UnixSocketListener { inner })
}

#[derive(Debug)]
pub struct KernelConfig {
    pub socket_path: PathBuf,
    pub http_addr: Option<String>,
    pub policy: PolicyConfig,
}

/// Owns every subsystem of a running daemon. `build` performs the
/// dependency-ordered startup; `run` serves until `shutdown` is signaled.
pub struct DaemonKernel {
    store: Arc<dyn Store>,
    lifecycle: Arc<LifecycleManager>,
    app_state: AppState,
    socket_path: PathBuf,
    http_addr: Option<String>,
    shutdown: Arc<Notify>,
}

pub struct KernelBackends {
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub graph_store: Option<Arc<dyn GraphStore>>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub extractor: Option<Arc<dyn Extractor>>,
    pub runtime: Option<Arc<dyn RuntimeProvider>>,
}

impl Default for KernelBackends {
    fn default() -> Self {
        Self { vector_store: None, graph_store: None, embedder: None, extractor: None, runtime: None }
    }
}

impl DaemonKernel {
    #[tracing::instrument(skip(store, backends))]
    pub async fn build(config: KernelConfig, store: Arc<dyn Store>, backends: KernelBackends) -> Result<Self> {
        info!("starting conduit kernel");

        let policy = PolicyEngine::new(config.policy.clone());
        info!("policy engine ready");

        if let Some(runtime) = &backends.runtime {
            if runtime.available().await {
                info!("container runtime reachable");
            } else {
                warn!("container runtime probe failed, connector instances will not start");
            }
        } else {
            info!("no container runtime configured, running in library-only mode");
        }

        let mut retrieval = RetrievalEngine::new(store.clone());
        if let Some(vector_store) = &backends.vector_store {
            if vector_store.available().await {
                info!("vector backend reachable");
            } else {
                warn!("vector backend probe failed, search will degrade to lexical-only");
            }
            retrieval = retrieval.with_vector_store(vector_store.clone());
        }
        if let Some(embedder) = &backends.embedder {
            retrieval = retrieval.with_embedder(embedder.clone());
        }

        let mut graph_query = GraphQueryEngine::new(store.clone());
        if let Some(graph_store) = &backends.graph_store {
            if graph_store.available().await {
                info!("graph backend reachable");
            } else {
                warn!("graph backend probe failed, KAG queries will be unavailable");
            }
            graph_query = graph_query.with_graph_store(graph_store.clone());
        }
        if let Some(extractor) = &backends.extractor {
            graph_query = graph_query.with_extractor(extractor.clone());
        }

        let events = EventBus::new();
        let mut lifecycle_manager = LifecycleManager::new(store.clone(), policy, events.clone());
        if let Some(runtime) = &backends.runtime {
            lifecycle_manager = lifecycle_manager.with_runtime(runtime.clone());
        }
        let lifecycle = Arc::new(lifecycle_manager);

        lifecycle.reconcile_on_start().await?;
        info!("lifecycle reconciliation complete");

        let mut indexer = Indexer::new(store.clone());
        if let Some(vector_store) = &backends.vector_store {
            indexer = indexer.with_vector_store(vector_store.clone());
        }
        if let Some(graph_store) = &backends.graph_store {
            indexer = indexer.with_graph_store(graph_store.clone());
        }
        if let Some(embedder) = &backends.embedder {
            indexer = indexer.with_embedder(embedder.clone());
        }
        if let Some(extractor) = &backends.extractor {
            indexer = indexer.with_extractor(extractor.clone());
        }
        let indexer = Arc::new(indexer);
        let source_manager = Arc::new(SourceManager::new(store.clone(), indexer.clone(), events.clone()));
        info!("source manager ready");

        let app_state = AppState {
            store: store.clone(),
            source_manager,
            retrieval: Arc::new(retrieval),
            graph: Arc::new(graph_query),
            lifecycle: lifecycle.clone(),
            indexer,
            vector_store: backends.vector_store.clone(),
            graph_store: backends.graph_store.clone(),
            runtime: backends.runtime.clone(),
        };

        Ok(Self {
            store,
            lifecycle,
            app_state,
            socket_path: config.socket_path,
            http_addr: config.http_addr,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Opens the Unix domain socket (and, if configured, a TCP listener) and
    /// serves the HTTP router until `shutdown_handle().notify_one()` fires.
    #[tracing::instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = bind_unix_socket(&self.socket_path)
            .map_err(|e| crate::errors::ConduitError::Other(anyhow::anyhow!("binding unix socket: {e}")))?;
        info!(socket = %self.socket_path.display(), "unix socket listener open");

        let router = http_server::build_router(self.app_state.clone());
        let shutdown = self.shutdown.clone();
        let uds_router = router.clone();

        let uds_server = axum::serve(listener, uds_router).with_graceful_shutdown(async move {
            shutdown.notified().await;
        });

        if let Some(addr) = self.http_addr.clone() {
            let tcp_shutdown = self.shutdown.clone();
            let tcp_listener = tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| crate::errors::ConduitError::Other(anyhow::anyhow!("binding tcp listener: {e}")))?;
            info!(addr, "tcp listener open");
            let tcp_server = axum::serve(tcp_listener, router).with_graceful_shutdown(async move {
                tcp_shutdown.notified().await;
            });
            let (uds_result, tcp_result) = tokio::join!(uds_server, tcp_server);
            uds_result.map_err(|e| crate::errors::ConduitError::Other(anyhow::anyhow!(e)))?;
            tcp_result.map_err(|e| crate::errors::ConduitError::Other(anyhow::anyhow!(e)))?;
        } else {
            uds_server.await.map_err(|e| crate::errors::ConduitError::Other(anyhow::anyhow!(e)))?;
        }

        self.teardown().await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn teardown(&self) {
        info!("shutting down conduit kernel");

        let instances = match self.store.list_instances().await {
            Ok(instances) => instances,
            Err(err) => {
                warn!(error = %err, "failed to list instances during shutdown");
                return;
            }
        };

        for instance in instances {
            if matches!(instance.status, crate::types::ConnectorStatus::Running | crate::types::ConnectorStatus::Degraded) {
                let outcome =
                    tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, self.lifecycle.stop(instance.id, Some(GRACEFUL_STOP_TIMEOUT.as_secs())))
                        .await;
                match outcome {
                    Ok(Ok(_)) => info!(instance_id = %instance.id, "instance stopped"),
                    Ok(Err(err)) => warn!(instance_id = %instance.id, error = %err, "instance stop failed during shutdown"),
                    Err(_) => warn!(instance_id = %instance.id, "instance stop exceeded shutdown grace period"),
                }
            }
        }

        if self.socket_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %err, "failed to remove unix socket on shutdown");
            }
        }
    }
}
