// Centralized observability infrastructure.
//
// Structured logging, trace context, and lightweight process-wide counters,
// following the same shape as the teacher's observability layer but with
// Operation variants that describe the conduit pipeline rather than raw
// storage reads/writes.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static SYNC_COUNTER: AtomicU64 = AtomicU64::new(0);
static SEARCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the daemon's defaults (warn-level, non-verbose).
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity; mirrors the daemon's
/// `--verbose`/`--quiet` flags (owned by the CLI collaborator, out of
/// scope here — this function is the ambient infrastructure it calls).
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("conduit=debug,info")
    } else {
        EnvFilter::new("conduit=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("conduit observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized — fine in tests
    }
}

/// Structured operation kinds logged across the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    SourceAdd { source_id: Uuid },
    SourceSync { source_id: Uuid, added: usize, updated: usize, deleted: usize },
    DocumentIndex { document_id: Uuid, decision: String },
    Search { query: String, mode: String, result_count: usize },
    GraphQuery { query: String, entity_count: usize },
    PolicyDecision { instance_id: Uuid, status: String },
    LifecycleTransition { instance_id: Uuid, from: String, to: String },
    Startup { version: String },
    Shutdown { reason: String },
}

/// Per-operation tracing context, carried through a call chain.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Log an operation with full trace context and update process counters.
pub fn log_operation(ctx: &OperationContext, op: &Operation, result: &Result<()>) {
    let elapsed = ctx.elapsed();
    let attrs = ctx
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");

    match result {
        Ok(()) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                parent_span_id = ?ctx.parent_span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                "operation completed: {:?}", op
            );
            OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                error = %e,
                "operation failed: {:?}", op
            );
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }

    match op {
        Operation::SourceSync { .. } => {
            SYNC_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::Search { .. } | Operation::GraphQuery { .. } => {
            SEARCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}

/// Execute a closure under a fresh trace context, logging start/stop.
pub async fn with_trace_id<F, T>(operation: &str, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let ctx = OperationContext::new(operation);
    info!(trace_id = %ctx.trace_id, "starting operation: {}", operation);
    let start = Instant::now();
    let result = f.await;
    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(trace_id = %ctx.trace_id, elapsed_ms = elapsed.as_millis(), "operation completed: {}", operation),
        Err(e) => error!(trace_id = %ctx.trace_id, elapsed_ms = elapsed.as_millis(), error = %e, "operation failed: {}", operation),
    }
    result
}

/// A process-wide metrics snapshot, exposed via `/api/v1/health`.
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "operations": {
            "total": OPERATION_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
            "syncs": SYNC_COUNTER.load(Ordering::Relaxed),
            "searches": SEARCH_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_context_child_shares_trace_id() {
        let ctx = OperationContext::new("parent");
        let child = ctx.child("child");
        assert_eq!(child.trace_id, ctx.trace_id);
        assert_eq!(child.parent_span_id, Some(ctx.span_id));
    }

    #[tokio::test]
    async fn with_trace_id_returns_inner_result() {
        let result = with_trace_id("test", async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn metrics_snapshot_has_expected_shape() {
        let metrics = get_metrics();
        assert!(metrics["operations"]["total"].is_u64());
        assert!(metrics["timestamp"].is_string());
    }
}
