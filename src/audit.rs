//! Audit logging for chain inspections and mutations
//!
//! Structured record of what the tool was asked and what it concluded:
//! evaluations, analyses, reconciliations and mode switches. The findings
//! this tool exists for raise no errors at the point of damage, so the
//! audit trail is often the only durable evidence of when a violation was
//! first visible.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EvaluatePacket,
    AnalyzeChain,
    SwitchMode,
    SaveIntent,
    DeleteIntent,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    /// Creates a new audit event
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates a new audit log instance
    ///
    /// # Errors
    ///
    /// Returns `Err` if the state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events from the log
    ///
    /// # Arguments
    ///
    /// * `count` - Maximum number of events to return
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    /// Returns the path to the audit log file
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

/// Logs a packet evaluation
pub async fn log_evaluate(packet: &str, action: &str, default_applied: bool) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::EvaluatePacket,
            true,
            serde_json::json!({
                "packet": packet,
                "action": action,
                "default_applied": default_applied,
            }),
            None,
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

/// Logs a chain analysis
pub async fn log_analyze(violations: usize, shadows: usize, unreachable: usize) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::AnalyzeChain,
            true,
            serde_json::json!({
                "violations": violations,
                "shadows": shadows,
                "unreachable": unreachable,
            }),
            None,
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

/// Logs a management-mode switch
pub async fn log_mode_switch(from: &str, to: &str) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::SwitchMode,
            true,
            serde_json::json!({
                "from": from,
                "to": to,
            }),
            None,
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

/// Logs an intent save
pub async fn log_save_intent(name: &str, rules: usize, success: bool, error: Option<String>) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::SaveIntent,
            success,
            serde_json::json!({
                "intent": name,
                "rule_count": rules,
            }),
            error,
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

/// Logs an intent deletion
pub async fn log_delete_intent(name: &str) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::DeleteIntent,
            true,
            serde_json::json!({
                "intent": name,
            }),
            None,
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}
