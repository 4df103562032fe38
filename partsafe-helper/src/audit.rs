//! Structured audit logging for privileged backup operations

use chrono::Utc;
use nix::unistd::{Uid, User};

/// Audit log entry for security-relevant events
#[derive(Debug, serde::Serialize)]
struct AuditEvent {
    timestamp: String,
    user_id: u32,
    user_name: Option<String>,
    process_id: u32,
    operation: String,
    resource: String,
    result: String,
    details: Option<String>,
}

impl AuditEvent {
    /// Event attributed to the user who invoked this process
    fn new(operation: &str, resource: &str, result: &str) -> Self {
        let uid = nix::unistd::getuid();

        Self {
            timestamp: Utc::now().to_rfc3339(),
            user_id: uid.as_raw(),
            user_name: username_from_uid(uid),
            process_id: std::process::id(),
            operation: operation.to_string(),
            resource: resource.to_string(),
            result: result.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    fn with_error(self, error: Option<&str>) -> Self {
        match error {
            Some(err) => self.with_details(format!("error: {err}")),
            None => self,
        }
    }

    /// Log the audit event as structured JSON
    fn log(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            log::info!(target: "audit", "{json}");
        } else {
            log::info!(
                target: "audit",
                "uid={} pid={} operation={} resource={} result={}",
                self.user_id,
                self.process_id,
                self.operation,
                self.resource,
                self.result
            );
        }
    }
}

/// Get username from UID (best effort; Android app uids often have no entry)
fn username_from_uid(uid: Uid) -> Option<String> {
    User::from_uid(uid).ok().flatten().map(|user| user.name)
}

fn outcome(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

/// Log a single-partition backup
pub fn log_partition_backup(partition: &str, success: bool, error: Option<&str>) {
    AuditEvent::new("backup_partition", partition, outcome(success))
        .with_error(error)
        .log();
}

/// Log a batch backup into one archive
pub fn log_batch_backup(partitions: &[String], success: bool, error: Option<&str>) {
    AuditEvent::new("backup_batch", &partitions.join(","), outcome(success))
        .with_error(error)
        .log();
}

/// Log removal of a backup artifact
pub fn log_backup_delete(path: &str, success: bool, error: Option<&str>) {
    AuditEvent::new("delete_backup", path, outcome(success))
        .with_error(error)
        .log();
}

/// Log an operation refused because root access is missing
pub fn log_auth_failure(operation: &str, reason: &str) {
    AuditEvent::new(operation, "root", "denied")
        .with_details(format!("reason: {reason}"))
        .log();
}
