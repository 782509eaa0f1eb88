//! Health report types for `doctor`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Conventional health path probed on a supervised server.
pub const HEALTH_PATH: &str = "/health";

/// Outcome of a doctor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Fail,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// Result of probing one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub status: HealthStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl DoctorReport {
    #[must_use]
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            reason: reason.into(),
            latency_ms: None,
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Fail,
            reason: reason.into(),
            latency_ms: None,
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

/// `http://127.0.0.1:<port>/health`
#[must_use]
pub fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}{HEALTH_PATH}")
}

/// Judge an HTTP response from the health endpoint.
#[must_use]
pub fn judge_response(url: &str, status: u16, latency: Duration, timeout: Duration) -> DoctorReport {
    let report = if latency > timeout {
        DoctorReport::fail(format!(
            "{url} answered {status} after {}ms, over the {}ms budget",
            latency.as_millis(),
            timeout.as_millis()
        ))
    } else if (200..300).contains(&status) {
        DoctorReport::ok(format!("Responded {status} from {url}"))
    } else {
        DoctorReport::fail(format!("Health endpoint returned HTTP {status} from {url}"))
    };
    report.with_latency(latency)
}
