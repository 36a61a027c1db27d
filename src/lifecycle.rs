// Lifecycle Manager (spec.md §4.12): the connector instance state machine,
// health polling, crash detection, and daemon-start reconciliation.
// Grounded on `coordinated_deletion.rs`'s persist-before-announce idiom
// (every transition is written to the Store before its event is published,
// so no caller ever observes a status the Store doesn't already have) and
// `binary_relationship_engine_async.rs`'s Arc-wrapped-engine-with-per-call-
// isolation shape, adapted here into a per-instance `tokio::sync::Mutex`
// so transitions on one instance never block a different instance's
// transitions (spec.md §5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::contracts::runtime::{ContainerSpec, ContainerState, PullOptions, RuntimeProvider};
use crate::contracts::{AuditResult, ConnectorInstance, Store};
use crate::errors::{ConduitError, Result};
use crate::events::{Event, EventBus};
use crate::policy::{DeclaredPermissions, PolicyEngine};
use crate::types::{AuditStatus, ConnectorStatus, ValidatedInstanceId};

const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
const DEGRADED_FAILURE_THRESHOLD: u32 = 2;

/// Whether `to` is a legal next state from `from`, per spec.md §4.12's
/// transition table.
pub fn is_valid_transition(from: ConnectorStatus, to: ConnectorStatus) -> bool {
    use ConnectorStatus::*;
    matches!(
        (from, to),
        (Created, Auditing)
            | (Auditing, Installed)
            | (Auditing, Blocked)
            | (Auditing, Failed)
            | (Installed, Starting)
            | (Installed, Removing)
            | (Starting, Running)
            | (Starting, Stopped)
            | (Starting, Failed)
            | (Running, Degraded)
            | (Running, Stopping)
            | (Running, Failed)
            | (Running, Restarting)
            | (Degraded, Running)
            | (Degraded, Stopping)
            | (Degraded, Failed)
            | (Stopping, Stopped)
            | (Stopping, Failed)
            | (Stopped, Starting)
            | (Stopped, Removing)
            | (Stopped, Updating)
            | (Removing, Removed)
            | (Removing, Failed)
            | (Failed, Starting)
            | (Failed, Removing)
            | (Updating, Installed)
            | (Updating, Failed)
            | (Restarting, Running)
            | (Restarting, Failed)
            | (Blocked, Removing)
    )
}

/// Drives the connector instance state machine over a `Store` plus an
/// optional container runtime; health polling and crash detection are
/// tracked in memory and reset whenever the daemon restarts.
pub struct LifecycleManager {
    store: Arc<dyn Store>,
    runtime: Option<Arc<dyn RuntimeProvider>>,
    policy: PolicyEngine,
    events: EventBus,
    locks: DashMap<ValidatedInstanceId, Arc<Mutex<()>>>,
    failure_counts: DashMap<ValidatedInstanceId, u32>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn Store>, policy: PolicyEngine, events: EventBus) -> Self {
        Self { store, runtime: None, policy, events, locks: DashMap::new(), failure_counts: DashMap::new() }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeProvider>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn lock_for(&self, instance_id: ValidatedInstanceId) -> Arc<Mutex<()>> {
        self.locks.entry(instance_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn transition(&self, instance_id: ValidatedInstanceId, to: ConnectorStatus) -> Result<ConnectorInstance> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| ConduitError::InstanceNotFound(instance_id.to_string()))?;

        if !is_valid_transition(instance.status, to) {
            return Err(ConduitError::InvalidTransition { from: instance.status.to_string(), to: to.to_string() });
        }

        let from = instance.status;
        instance.status = to;
        instance.updated_at = Utc::now();
        self.store.update_instance(instance.clone()).await?;
        self.events.publish(Event::InstanceTransitioned { instance_id, from, to });
        Ok(instance)
    }

    /// Creates a new instance in `CREATED` and immediately runs the audit
    /// transition (spec.md §4.12's first edge is unconditional).
    #[instrument(skip(self, declared))]
    pub async fn create_and_audit(
        &self,
        package_id: String,
        package_version: String,
        display_name: String,
        image_reference: String,
        declared: DeclaredPermissions,
    ) -> Result<ConnectorInstance> {
        let instance_id = ValidatedInstanceId::new();
        let now = Utc::now();
        let instance = ConnectorInstance {
            id: instance_id,
            package_id,
            package_version,
            display_name,
            status: ConnectorStatus::Created,
            container_id: None,
            image_reference,
            config: HashMap::new(),
            granted_permissions: None,
            audit_result: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            stopped_at: None,
            health_status: crate::contracts::HealthStatus::Unknown,
            last_error: None,
        };
        self.store.create_instance(instance).await?;

        let _guard = self.lock_for(instance_id).lock_owned().await;
        self.transition(instance_id, ConnectorStatus::Auditing).await?;

        let decision = self.policy.evaluate(instance_id.as_uuid(), &declared);
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| ConduitError::InstanceNotFound(instance_id.to_string()))?;
        instance.granted_permissions = decision.granted.clone();
        instance.audit_result = Some(AuditResult {
            status: decision.status,
            score: if decision.status == AuditStatus::Pass { 1.0 } else { 0.0 },
            checks: Vec::new(),
        });
        instance.updated_at = Utc::now();
        self.store.update_instance(instance).await?;

        let next = if decision.status == AuditStatus::Block { ConnectorStatus::Blocked } else { ConnectorStatus::Installed };
        self.transition(instance_id, next).await
    }

    #[instrument(skip(self))]
    pub async fn start(&self, instance_id: ValidatedInstanceId) -> Result<ConnectorInstance> {
        let _guard = self.lock_for(instance_id).lock_owned().await;
        let instance = self.transition(instance_id, ConnectorStatus::Starting).await?;

        let Some(runtime) = &self.runtime else {
            self.transition(instance_id, ConnectorStatus::Failed).await?;
            return Err(ConduitError::RuntimeUnavailable("no container runtime attached".to_string()));
        };

        let permissions = instance.granted_permissions.clone().unwrap_or_default();
        let spec = ContainerSpec {
            image: instance.image_reference.clone(),
            name: format!("conduit-{instance_id}"),
            env: instance.config.clone(),
            mounts: Vec::new(),
            security: crate::contracts::runtime::SecuritySpec {
                network_enabled: permissions.network_enabled,
                ..Default::default()
            },
        };

        let run_result = match runtime.pull(&spec.image, PullOptions::default()).await {
            Ok(()) => runtime.run(spec).await,
            Err(err) => Err(err),
        };

        match run_result {
            Ok(container_id) => {
                let mut instance = self
                    .store
                    .get_instance(instance_id)
                    .await?
                    .ok_or_else(|| ConduitError::InstanceNotFound(instance_id.to_string()))?;
                instance.container_id = Some(container_id);
                instance.started_at = Some(Utc::now());
                instance.updated_at = Utc::now();
                self.store.update_instance(instance).await?;
                self.failure_counts.remove(&instance_id);
                self.transition(instance_id, ConnectorStatus::Running).await
            }
            Err(err) => {
                self.set_last_error(instance_id, err.to_string()).await?;
                self.transition(instance_id, ConnectorStatus::Failed).await
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, instance_id: ValidatedInstanceId, timeout_secs: Option<u64>) -> Result<ConnectorInstance> {
        let _guard = self.lock_for(instance_id).lock_owned().await;
        let instance = self.transition(instance_id, ConnectorStatus::Stopping).await?;

        if let (Some(runtime), Some(container_id)) = (&self.runtime, &instance.container_id) {
            if let Err(err) = runtime.stop(container_id, timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS)).await {
                warn!(error = %err, instance_id = %instance_id, "stop reported an error, continuing to STOPPED");
            }
        }

        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| ConduitError::InstanceNotFound(instance_id.to_string()))?;
        instance.stopped_at = Some(Utc::now());
        instance.updated_at = Utc::now();
        self.store.update_instance(instance).await?;

        self.transition(instance_id, ConnectorStatus::Stopped).await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, instance_id: ValidatedInstanceId, force: bool) -> Result<()> {
        let _guard = self.lock_for(instance_id).lock_owned().await;
        let instance = self.transition(instance_id, ConnectorStatus::Removing).await?;

        if let (Some(runtime), Some(container_id)) = (&self.runtime, &instance.container_id) {
            if let Err(err) = runtime.remove(container_id, force).await {
                warn!(error = %err, instance_id = %instance_id, "remove reported an error, continuing to REMOVED");
            }
        }

        self.transition(instance_id, ConnectorStatus::Removed).await?;
        self.locks.remove(&instance_id);
        self.failure_counts.remove(&instance_id);
        Ok(())
    }

    async fn set_last_error(&self, instance_id: ValidatedInstanceId, message: String) -> Result<()> {
        if let Some(mut instance) = self.store.get_instance(instance_id).await? {
            instance.last_error = Some(message);
            instance.updated_at = Utc::now();
            self.store.update_instance(instance).await?;
        }
        Ok(())
    }

    /// Polls a single `RUNNING`/`DEGRADED` instance's container status.
    /// Two consecutive failed probes move it to `DEGRADED`; any successful
    /// probe while `DEGRADED` moves it back to `RUNNING`. A probe reporting
    /// the container exited transitions straight to `FAILED` (crash
    /// detection).
    #[instrument(skip(self))]
    pub async fn health_poll(&self, instance_id: ValidatedInstanceId) -> Result<()> {
        let _guard = self.lock_for(instance_id).lock_owned().await;
        let instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| ConduitError::InstanceNotFound(instance_id.to_string()))?;

        if !matches!(instance.status, ConnectorStatus::Running | ConnectorStatus::Degraded) {
            return Ok(());
        }
        let (Some(runtime), Some(container_id)) = (&self.runtime, &instance.container_id) else {
            return Ok(());
        };

        let probe = runtime.status(container_id).await;
        match probe {
            Ok(ContainerState::Running) => {
                self.failure_counts.remove(&instance_id);
                if instance.status == ConnectorStatus::Degraded {
                    self.transition(instance_id, ConnectorStatus::Running).await?;
                }
                self.events.publish(Event::InstanceHealthChanged { instance_id, healthy: true });
            }
            Ok(ContainerState::Exited) => {
                self.set_last_error(instance_id, "container exited unexpectedly".to_string()).await?;
                self.transition(instance_id, ConnectorStatus::Failed).await?;
                self.events.publish(Event::InstanceHealthChanged { instance_id, healthy: false });
            }
            Ok(ContainerState::Unknown) | Err(_) => {
                let failures = {
                    let mut entry = self.failure_counts.entry(instance_id).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if failures >= DEGRADED_FAILURE_THRESHOLD && instance.status == ConnectorStatus::Running {
                    self.transition(instance_id, ConnectorStatus::Degraded).await?;
                    self.events.publish(Event::InstanceHealthChanged { instance_id, healthy: false });
                }
            }
        }
        Ok(())
    }

    /// Daemon-start recovery (spec.md §4.12): reconciles every persisted
    /// instance's status against what the runtime actually reports. State
    /// wins when a container is running but the persisted status says
    /// stopped.
    #[instrument(skip(self))]
    pub async fn reconcile_on_start(&self) -> Result<()> {
        let Some(runtime) = self.runtime.clone() else { return Ok(()) };
        let instances = self.store.list_instances().await?;

        for instance in instances {
            let Some(container_id) = &instance.container_id else { continue };
            let probe = runtime.status(container_id).await;
            match (instance.status, probe) {
                (ConnectorStatus::Running | ConnectorStatus::Degraded, Ok(ContainerState::Exited) | Err(_)) => {
                    self.set_last_error(instance.id, "container missing or exited while daemon was down".to_string()).await?;
                    if let Err(err) = self.transition(instance.id, ConnectorStatus::Failed).await {
                        warn!(error = %err, instance_id = %instance.id, "failed to reconcile instance to FAILED");
                    }
                }
                (ConnectorStatus::Stopped, Ok(ContainerState::Running)) => {
                    if let Err(err) = runtime.stop(container_id, DEFAULT_STOP_TIMEOUT_SECS).await {
                        warn!(error = %err, instance_id = %instance.id, "failed to stop orphaned running container during reconcile");
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyConfig;
    use crate::store::FileStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(store: Arc<dyn Store>) -> LifecycleManager {
        LifecycleManager::new(store, PolicyEngine::new(PolicyConfig::default()), EventBus::new())
    }

    async fn test_store() -> (Arc<dyn Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());
        (store, dir)
    }

    #[test]
    fn transition_table_matches_spec_graph() {
        use ConnectorStatus::*;
        assert!(is_valid_transition(Created, Auditing));
        assert!(is_valid_transition(Running, Degraded));
        assert!(is_valid_transition(Degraded, Running));
        assert!(!is_valid_transition(Stopped, Running));
        assert!(!is_valid_transition(Removed, Starting));
        assert!(!is_valid_transition(Created, Running));
    }

    #[tokio::test]
    async fn audit_pass_reaches_installed() {
        let (store, _dir) = test_store().await;
        let manager = engine(store);
        let instance = manager
            .create_and_audit("pkg".to_string(), "1.0.0".to_string(), "demo".to_string(), "demo:latest".to_string(), DeclaredPermissions::default())
            .await
            .unwrap();
        assert_eq!(instance.status, ConnectorStatus::Installed);
    }

    #[tokio::test]
    async fn audit_block_reaches_blocked() {
        let (store, _dir) = test_store().await;
        let manager = engine(store);
        let declared = DeclaredPermissions { read_paths: vec!["/etc/shadow".to_string()], ..Default::default() };
        let instance = manager
            .create_and_audit("pkg".to_string(), "1.0.0".to_string(), "demo".to_string(), "demo:latest".to_string(), declared)
            .await
            .unwrap();
        assert_eq!(instance.status, ConnectorStatus::Blocked);
    }

    #[tokio::test]
    async fn stop_from_stopped_is_rejected() {
        let (store, _dir) = test_store().await;
        let manager = engine(store.clone());
        let instance = manager
            .create_and_audit("pkg".to_string(), "1.0.0".to_string(), "demo".to_string(), "demo:latest".to_string(), DeclaredPermissions::default())
            .await
            .unwrap();
        let err = manager.transition(instance.id, ConnectorStatus::Stopped).await.unwrap_err();
        assert!(matches!(err, ConduitError::InvalidTransition { .. }));
    }

    struct FakeRuntime {
        state: Mutex<ContainerState>,
        run_calls: AtomicUsize,
    }

    #[async_trait]
    impl RuntimeProvider for FakeRuntime {
        async fn available(&self) -> bool {
            true
        }
        async fn pull(&self, _image: &str, _opts: PullOptions) -> Result<()> {
            Ok(())
        }
        async fn run(&self, _spec: ContainerSpec) -> Result<String> {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().await = ContainerState::Running;
            Ok("container-1".to_string())
        }
        async fn stop(&self, _container_id: &str, _timeout_secs: u64) -> Result<()> {
            *self.state.lock().await = ContainerState::Exited;
            Ok(())
        }
        async fn remove(&self, _container_id: &str, _force: bool) -> Result<()> {
            Ok(())
        }
        async fn status(&self, _container_id: &str) -> Result<ContainerState> {
            Ok(*self.state.lock().await)
        }
    }

    #[tokio::test]
    async fn start_then_stop_round_trips_through_running() {
        let (store, _dir) = test_store().await;
        let runtime = Arc::new(FakeRuntime { state: Mutex::new(ContainerState::Unknown), run_calls: AtomicUsize::new(0) });
        let manager = engine(store).with_runtime(runtime.clone());

        let instance = manager
            .create_and_audit("pkg".to_string(), "1.0.0".to_string(), "demo".to_string(), "demo:latest".to_string(), DeclaredPermissions::default())
            .await
            .unwrap();

        let running = manager.start(instance.id).await.unwrap();
        assert_eq!(running.status, ConnectorStatus::Running);
        assert_eq!(running.container_id.as_deref(), Some("container-1"));
        assert_eq!(runtime.run_calls.load(Ordering::SeqCst), 1);

        let stopped = manager.stop(instance.id, None).await.unwrap();
        assert_eq!(stopped.status, ConnectorStatus::Stopped);
    }

    #[tokio::test]
    async fn health_poll_degrades_after_two_failed_probes() {
        let (store, _dir) = test_store().await;
        let runtime = Arc::new(FakeRuntime { state: Mutex::new(ContainerState::Unknown), run_calls: AtomicUsize::new(0) });
        let manager = engine(store).with_runtime(runtime.clone());

        let instance = manager
            .create_and_audit("pkg".to_string(), "1.0.0".to_string(), "demo".to_string(), "demo:latest".to_string(), DeclaredPermissions::default())
            .await
            .unwrap();
        manager.start(instance.id).await.unwrap();
        *runtime.state.lock().await = ContainerState::Unknown;

        manager.health_poll(instance.id).await.unwrap();
        manager.health_poll(instance.id).await.unwrap();

        let refreshed = manager.store.get_instance(instance.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, ConnectorStatus::Degraded);
    }
}
