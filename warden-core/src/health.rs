//! Store and component health types
//!
//! [`StoreInfo`] is what the key-value layer reports about itself;
//! [`HealthCheck`] is the component-level summary built from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Remote store reachable
    Healthy,
    /// Serving from process-local fallback
    Degraded,
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    pub message: Option<String>,
    pub response_time_ms: Option<i64>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Which store is currently answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Connected,
    Fallback,
    Error,
}

/// Kind of backend behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Redis,
    Upstash,
    InMemory,
}

/// Observational report about the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub status: StoreStatus,
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    pub total_keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreInfo {
    /// Report for the in-process fallback map.
    pub fn fallback(total_keys: u64) -> Self {
        Self {
            status: StoreStatus::Fallback,
            backend: BackendKind::InMemory,
            version: None,
            used_memory: None,
            connected_clients: None,
            total_keys,
            error: None,
        }
    }

    pub fn error(backend: BackendKind, error: impl Into<String>) -> Self {
        Self {
            status: StoreStatus::Error,
            backend,
            version: None,
            used_memory: None,
            connected_clients: None,
            total_keys: 0,
            error: Some(error.into()),
        }
    }

    pub fn health_status(&self) -> HealthStatus {
        match self.status {
            StoreStatus::Connected => HealthStatus::Healthy,
            StoreStatus::Fallback => HealthStatus::Degraded,
            StoreStatus::Error => HealthStatus::Degraded,
        }
    }
}
