//! IPC request/response shapes and protocol versioning (§6.3).

use serde::{Deserialize, Serialize};

/// The daemon's protocol version. Bumped whenever a request/response shape
/// changes in a way older clients can't parse.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// One IPC request frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    pub op: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// One IPC response frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

/// Health status reported by the `health` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Body of a `health` response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Health {
    pub status: HealthState,
    pub version: String,
    pub compatible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compares a client's protocol version against [`PROTOCOL_VERSION`] using
/// semver "same major, client minor <= server minor" compatibility: a
/// client built against an older minor version can still talk to a newer
/// daemon, but a major version bump or a newer client than the running
/// daemon is incompatible (§4.6 "client... terminates the daemon and
/// starts a new one").
pub fn is_compatible(client_version: &str) -> bool {
    let Some(client) = parse_semver(client_version) else {
        return false;
    };
    let Some(server) = parse_semver(PROTOCOL_VERSION) else {
        return false;
    };
    client.0 == server.0 && client.1 <= server.1
}

fn parse_semver(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_version_is_compatible() {
        assert!(is_compatible(PROTOCOL_VERSION));
    }

    #[test]
    fn older_minor_is_compatible() {
        assert!(is_compatible("1.0.0"));
    }

    #[test]
    fn different_major_is_incompatible() {
        assert!(!is_compatible("2.0.0"));
    }

    #[test]
    fn newer_minor_than_server_is_incompatible() {
        assert!(!is_compatible("1.99.0"));
    }

    #[test]
    fn garbage_version_is_incompatible() {
        assert!(!is_compatible("not-a-version"));
    }
}
