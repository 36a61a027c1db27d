// Policy Engine (spec.md §4.10). Evaluates a connector package's declared
// permissions against a built-in forbidden-path list and a configured
// allow-list carve-out. Deterministic given the same inputs; every decision
// is logged via observability::log_operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::{log_operation, Operation, OperationContext};
use crate::types::{AuditStatus, Severity};

/// Root-relative directories that are always denied, regardless of
/// allow-list, unless the requested path falls under an explicit carve-out.
const FORBIDDEN_PREFIXES: &[&str] = &["/etc", "/root", "/boot", "/sys", "/proc", "/var/lib"];

/// Home-relative secret-store directories, denied the same way.
const FORBIDDEN_HOME_SUFFIXES: &[&str] =
    &[".ssh", ".gnupg", ".aws", ".config/gcloud", ".kube", ".docker"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredPermissions {
    pub read_paths: Vec<String>,
    pub write_paths: Vec<String>,
    pub network_hosts: Vec<String>,
    pub network_enabled: bool,
}

/// The permission set granted to a connector instance after policy
/// evaluation. Only paths/hosts that survived the deny-list appear here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSet {
    pub read_paths: Vec<String>,
    pub write_paths: Vec<String>,
    pub network_hosts: Vec<String>,
    pub network_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Additional allow-list carve-outs, e.g. the OS temp directory.
    pub allowed_prefixes: Vec<String>,
    pub home_dir: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec![std::env::temp_dir().to_string_lossy().into_owned()],
            home_dir: std::env::var("HOME").unwrap_or_else(|_| "/root".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub status: AuditStatus,
    pub granted: Option<PermissionSet>,
    pub blocked_paths: Vec<String>,
}

pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// True if `path` matches a carve-out in the allow-list, which overrides
    /// the forbidden-path list.
    fn is_allowed(&self, path: &str) -> bool {
        self.config.allowed_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_forbidden(&self, path: &str) -> bool {
        if self.is_allowed(path) {
            return false;
        }
        if FORBIDDEN_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        FORBIDDEN_HOME_SUFFIXES
            .iter()
            .any(|suffix| path.starts_with(&format!("{}/{}", self.config.home_dir, suffix)))
    }

    /// Evaluates declared permissions deterministically. Any forbidden path
    /// in either read or write sets blocks the whole request (P8). Every
    /// decision is logged via `observability::log_operation`, keyed on the
    /// instance it was evaluated for.
    pub fn evaluate(&self, instance_id: Uuid, declared: &DeclaredPermissions) -> PolicyDecision {
        let ctx = OperationContext::new("policy.evaluate");
        let mut blocked = Vec::new();
        for path in declared.read_paths.iter().chain(declared.write_paths.iter()) {
            if self.is_forbidden(path) {
                blocked.push(path.clone());
            }
        }

        let decision = if !blocked.is_empty() {
            PolicyDecision { status: AuditStatus::Block, granted: None, blocked_paths: blocked }
        } else {
            PolicyDecision {
                status: AuditStatus::Pass,
                granted: Some(PermissionSet {
                    read_paths: declared.read_paths.clone(),
                    write_paths: declared.write_paths.clone(),
                    network_hosts: declared.network_hosts.clone(),
                    network_enabled: declared.network_enabled,
                }),
                blocked_paths: Vec::new(),
            }
        };

        log_operation(
            &ctx,
            &Operation::PolicyDecision { instance_id, status: format!("{:?}", decision.status) },
            &Ok(()),
        );

        decision
    }

    pub fn severity_for(status: AuditStatus) -> Severity {
        match status {
            AuditStatus::Pass => Severity::Info,
            AuditStatus::Warn => Severity::Warning,
            AuditStatus::Block => Severity::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicyConfig { allowed_prefixes: vec!["/tmp".into()], home_dir: "/home/user".into() })
    }

    #[test]
    fn blocks_forbidden_root_path() {
        let decision = engine().evaluate(
            Uuid::new_v4(),
            &DeclaredPermissions { read_paths: vec!["/etc/shadow".into()], ..Default::default() },
        );
        assert_eq!(decision.status, AuditStatus::Block);
        assert_eq!(decision.blocked_paths, vec!["/etc/shadow".to_string()]);
    }

    #[test]
    fn blocks_home_secret_store() {
        let decision = engine().evaluate(
            Uuid::new_v4(),
            &DeclaredPermissions { read_paths: vec!["/home/user/.ssh/id_ed25519".into()], ..Default::default() },
        );
        assert_eq!(decision.status, AuditStatus::Block);
    }

    #[test]
    fn allow_list_carves_out_temp_dir_under_forbidden_prefix() {
        let decision = engine().evaluate(
            Uuid::new_v4(),
            &DeclaredPermissions { read_paths: vec!["/tmp/connector-scratch".into()], ..Default::default() },
        );
        assert_eq!(decision.status, AuditStatus::Pass);
        assert!(decision.granted.is_some());
    }

    #[test]
    fn passes_ordinary_path() {
        let decision = engine().evaluate(
            Uuid::new_v4(),
            &DeclaredPermissions {
                read_paths: vec!["/data/project".into()],
                write_paths: vec!["/data/project/out".into()],
                ..Default::default()
            },
        );
        assert_eq!(decision.status, AuditStatus::Pass);
        let granted = decision.granted.unwrap();
        assert_eq!(granted.read_paths, vec!["/data/project".to_string()]);
    }
}
