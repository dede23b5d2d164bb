//! Configuration for queues, tasks and the process-wide app.
//!
//! Everything here is plain serde data with defaults, so a partial JSON
//! document is always valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::QueueError;

/// Coarse priority hint attached to a queue.
///
/// The tokio pool does not prioritise between queues; the level is kept on the
/// queue and reported in logs so that other `WorkerPool` implementations can
/// act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLevel {
    Background,
    Utility,
    #[default]
    Normal,
    UserInitiated,
    UserInteractive,
}

/// Queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,

    /// Maximum number of tasks executing at once. `None` means unbounded.
    pub max_concurrent: Option<usize>,

    pub service_level: ServiceLevel,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            max_concurrent: None,
            service_level: ServiceLevel::Normal,
        }
    }
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_concurrent == Some(0) {
            return Err(QueueError::Config(format!(
                "queue '{}': max_concurrent must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Per-task execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Required for snapshots and for naming dependencies.
    pub name: Option<String>,

    /// Total attempts allowed (initial attempt included).
    pub maximum_retries: u32,

    /// When set, only explicit `Task::retry` calls run further attempts.
    pub manual_retry: bool,

    /// When set, the body must call `Task::finish` itself.
    pub manual_finish: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            name: None,
            maximum_retries: 3,
            manual_retry: false,
            manual_finish: false,
        }
    }
}

/// Process-level configuration: the shared queue and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub shared: QueueConfig,

    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shared: QueueConfig::named("shared"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(s: &str) -> Result<Self, QueueError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| QueueError::Config(format!("json decode: {e}")))?;
        config.shared.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_options_default_is_three_attempts() {
        let o = TaskOptions::default();
        assert_eq!(o.maximum_retries, 3);
        assert!(!o.manual_retry);
        assert!(!o.manual_finish);
        assert!(o.name.is_none());
    }

    #[test]
    fn queue_config_defaults_to_unbounded_normal() {
        let c = QueueConfig::default();
        assert_eq!(c.max_concurrent, None);
        assert_eq!(c.service_level, ServiceLevel::Normal);
    }

    #[test]
    fn partial_task_options_fill_defaults() {
        let o: TaskOptions = serde_json::from_str(r#"{ "name": "fetch" }"#).unwrap();
        assert_eq!(o.name.as_deref(), Some("fetch"));
        assert_eq!(o.maximum_retries, 3);
    }

    #[test]
    fn app_config_without_shared_gets_default_shared_queue() {
        let c = AppConfig::from_json_str(r#"{ "log_level": "debug" }"#).unwrap();
        assert_eq!(c.shared.name, "shared");
        assert_eq!(c.log_level, "debug");
    }

    #[test]
    fn app_config_reads_service_level() {
        let json = r#"
        {
          "shared": { "name": "main", "max_concurrent": 4, "service_level": "user_initiated" }
        }"#;
        let c = AppConfig::from_json_str(json).unwrap();
        assert_eq!(c.shared.max_concurrent, Some(4));
        assert_eq!(c.shared.service_level, ServiceLevel::UserInitiated);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = AppConfig::from_json_str(r#"{ "shared": { "max_concurrent": 0 } }"#);
        assert!(matches!(err, Err(QueueError::Config(_))));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = AppConfig::from_json_str("{ not json");
        assert!(matches!(err, Err(QueueError::Config(msg)) if msg.contains("json decode")));
    }
}
