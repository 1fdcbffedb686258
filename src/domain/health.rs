//! Health classification and the public health report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Error rate above which the sender is reported unhealthy.
pub const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Error rate above which the sender is reported degraded.
pub const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    /// Error rate at or below 10%
    Healthy,
    /// Error rate above 10%
    Degraded,
    /// Error rate above 50%
    Unhealthy,
}

impl HealthLevel {
    /// Ratio of errors to sent messages.
    ///
    /// The denominator is `messages_sent + 1`, so an idle sender has rate 0.
    pub fn error_rate(messages_sent: u64, error_count: u64) -> f64 {
        error_count as f64 / (messages_sent as f64 + 1.0)
    }

    /// Classify a sender from its counters.
    pub fn from_counts(messages_sent: u64, error_count: u64) -> Self {
        let rate = Self::error_rate(messages_sent, error_count);
        if rate > UNHEALTHY_ERROR_RATE {
            HealthLevel::Unhealthy
        } else if rate > DEGRADED_ERROR_RATE {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        }
    }

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of the store as last observed by a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// The last store call succeeded
    Connected,
    /// The last store call failed, or the sender is closed
    Disconnected,
}

impl ConnectionState {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    /// Derived classification
    pub status: HealthLevel,
    /// Messages written successfully
    pub messages_sent: u64,
    /// Failed calls
    pub error_count: u64,
    /// `error_count / (messages_sent + 1)`
    pub error_rate: f64,
    /// Time of the last successful write
    pub last_success: Option<DateTime<Utc>>,
    /// Text of the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Time of the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    /// Time since the sender was created
    pub uptime: Duration,
    /// Store connection state
    pub connection_state: ConnectionState,
    /// Circuit breaker state label (`closed`, `open`, `half-open`)
    pub circuit_breaker: String,
}
