//! Supervisor status types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Coarse lifecycle state of the supervised server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    /// Between a start command and the end of readiness polling
    Starting,
    Running,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Starting => write!(f, "starting"),
            RunState::Running => write!(f, "running"),
        }
    }
}

/// Progress of the readiness poller for the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadinessState {
    #[default]
    Idle,
    Probing {
        attempt: u32,
    },
    Ready,
    /// Every attempt failed; needs a manual stop/start to re-arm
    Exhausted,
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadinessState::Idle => write!(f, "idle"),
            ReadinessState::Probing { attempt } => write!(f, "probing (attempt {attempt})"),
            ReadinessState::Ready => write!(f, "ready"),
            ReadinessState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Body of `GET /api/v1/version` on the SPX server.
///
/// Every field is optional. A field that is missing or has an unexpected
/// type reads as `None` and leaves the value reported by an earlier probe
/// untouched; only a body that is not a JSON object is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub license: Option<LicenseInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    /// Whole days left; fractional values are truncated
    #[serde(default, deserialize_with = "whole_days")]
    pub days: Option<i64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn whole_days<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let days = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        _ => None,
    };
    Ok(days)
}

/// Identity of the running server, learned from a successful probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub version: Option<String>,
    pub host_id: Option<String>,
    pub license_days_remaining: Option<i64>,
}

impl Identity {
    /// Overwrite only the fields present in `info`.
    pub fn merge(&mut self, info: &VersionInfo) {
        if let Some(version) = &info.version {
            self.version = Some(version.clone());
        }
        if let Some(id) = &info.id {
            self.host_id = Some(id.clone());
        }
        if let Some(days) = info.license.as_ref().and_then(|l| l.days) {
            self.license_days_remaining = Some(days);
        }
    }
}

/// Status reported over the control socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub run_state: RunState,
    pub status_message: String,
    pub control_port: u16,
    pub port_resolved: bool,
    pub identity: Option<Identity>,
    pub uptime_secs: u64,
    pub readiness: ReadinessState,
    pub generation: u64,
    pub log_lines: usize,
    pub logs_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_body_parses_all_fields() {
        let info: VersionInfo =
            serde_json::from_str(r#"{"version":"2.1.0","id":"abc123","license":{"days":30}}"#)
                .unwrap();
        let mut identity = Identity::default();
        identity.merge(&info);
        assert_eq!(identity.version.as_deref(), Some("2.1.0"));
        assert_eq!(identity.host_id.as_deref(), Some("abc123"));
        assert_eq!(identity.license_days_remaining, Some(30));
    }

    #[test]
    fn version_body_tolerates_missing_and_unknown_fields() {
        let info: VersionInfo =
            serde_json::from_str(r#"{"version":"2.1.0","build":"x","license":{}}"#).unwrap();
        assert_eq!(info.id, None);
        assert_eq!(info.license, Some(LicenseInfo { days: None }));

        let empty: VersionInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, VersionInfo::default());
    }

    #[test]
    fn fractional_license_days_are_truncated() {
        let info: VersionInfo = serde_json::from_str(
            r#"{"version":"2.1.0","id":"abc123","license":{"days":30.5}}"#,
        )
        .unwrap();
        assert_eq!(info.version.as_deref(), Some("2.1.0"));
        assert_eq!(info.license, Some(LicenseInfo { days: Some(30) }));
    }

    #[test]
    fn wrongly_typed_fields_read_as_absent() {
        let info: VersionInfo = serde_json::from_str(
            r#"{"version":2,"id":"abc123","license":{"days":"soon"}}"#,
        )
        .unwrap();
        assert_eq!(info.version, None);
        assert_eq!(info.id.as_deref(), Some("abc123"));
        assert_eq!(info.license, Some(LicenseInfo { days: None }));

        let info: VersionInfo = serde_json::from_str(r#"{"license":"forever"}"#).unwrap();
        assert_eq!(info.license, None);

        let mut identity = Identity {
            version: Some("1.0.0".to_string()),
            host_id: None,
            license_days_remaining: Some(12),
        };
        identity.merge(
            &serde_json::from_str(r#"{"version":null,"license":{"days":[1]}}"#).unwrap(),
        );
        assert_eq!(identity.version.as_deref(), Some("1.0.0"));
        assert_eq!(identity.license_days_remaining, Some(12));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(serde_json::from_str::<VersionInfo>("[]").is_err());
        assert!(serde_json::from_str::<VersionInfo>("\"ok\"").is_err());
    }

    #[test]
    fn merge_keeps_previous_values_for_absent_fields() {
        let mut identity = Identity {
            version: Some("1.0.0".to_string()),
            host_id: Some("host-a".to_string()),
            license_days_remaining: Some(12),
        };
        identity.merge(&VersionInfo {
            version: Some("1.0.1".to_string()),
            id: None,
            license: None,
        });
        assert_eq!(identity.version.as_deref(), Some("1.0.1"));
        assert_eq!(identity.host_id.as_deref(), Some("host-a"));
        assert_eq!(identity.license_days_remaining, Some(12));
    }

    #[test]
    fn readiness_serializes_with_attempt() {
        let json = serde_json::to_string(&ReadinessState::Probing { attempt: 3 }).unwrap();
        assert_eq!(json, r#"{"state":"probing","attempt":3}"#);
        assert_eq!(ReadinessState::Probing { attempt: 3 }.to_string(), "probing (attempt 3)");
    }

    #[test]
    fn run_state_display() {
        assert_eq!(RunState::Starting.to_string(), "starting");
        assert_eq!(RunState::default(), RunState::Stopped);
    }
}
