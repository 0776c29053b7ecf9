// ── Provisioning outcomes ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::host::{HostEntry, Role, Transport};

/// Result of one configuration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Applied,
    AlreadyPresent,
    Failed,
    /// Not attempted. Never counts as a failure.
    Skipped,
}

impl StepOutcome {
    /// The step left the device in the desired state.
    pub fn is_effective(self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyPresent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub description: String,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepResult {
    pub fn applied(description: impl Into<String>) -> Self {
        Self::new(description, StepOutcome::Applied, None)
    }

    pub fn already_present(description: impl Into<String>) -> Self {
        Self::new(description, StepOutcome::AlreadyPresent, None)
    }

    pub fn failed(description: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(description, StepOutcome::Failed, Some(detail.into()))
    }

    pub fn skipped(description: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(description, StepOutcome::Skipped, Some(detail.into()))
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn new(description: impl Into<String>, outcome: StepOutcome, detail: Option<String>) -> Self {
        Self {
            description: description.into(),
            outcome,
            detail,
        }
    }
}

/// Aggregate status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DeviceStatus {
    Success,
    Partial,
    Failed,
}

impl DeviceStatus {
    /// SUCCESS when nothing failed, PARTIAL when some steps failed and some
    /// took effect, FAILED when every attempted step failed.
    pub fn from_steps(steps: &[StepResult]) -> Self {
        let failed = steps.iter().any(|s| s.outcome == StepOutcome::Failed);
        if !failed {
            Self::Success
        } else if steps.iter().any(|s| s.outcome.is_effective()) {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

/// Statistics from pinging one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingSummary {
    pub target: String,
    pub sent: u32,
    pub received: u32,
    pub loss_percent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rtt_ms: Option<f64>,
    /// Why no statistics could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PingSummary {
    /// A ping that produced no usable summary.
    pub fn failed(target: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            sent: 0,
            received: 0,
            loss_percent: 100,
            avg_rtt_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.received > 0
    }
}

/// Smallest IPv6 link MTU (RFC 8200).
pub const IPV6_MIN_MTU: u32 = 1280;

/// Result of the do-not-fragment size sweep towards the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuProbe {
    /// Largest size that got a reply.
    pub largest_ok: Option<u32>,
    /// The size that ended the sweep, if any did.
    pub first_failed: Option<u32>,
    /// Sizes tried, in order.
    pub tested: Vec<u32>,
}

impl MtuProbe {
    pub fn is_adequate(&self) -> bool {
        self.largest_ok.is_some_and(|mtu| mtu >= IPV6_MIN_MTU)
    }
}

/// Connectivity checks run on a client after configuration.
///
/// Informational only: nothing here changes the device status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayProbe {
    pub gateway: PingSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<PingSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<MtuProbe>,
}

impl GatewayProbe {
    pub fn is_reachable(&self) -> bool {
        self.gateway.is_reachable()
    }

    /// At least one external target answered, or none were configured.
    pub fn external_reachable(&self) -> bool {
        self.external.is_empty() || self.external.iter().any(PingSummary::is_reachable)
    }

    /// Gateway and outside world reachable, and the path MTU (when swept)
    /// carries a minimum-size IPv6 packet.
    pub fn all_ok(&self) -> bool {
        self.is_reachable()
            && self.external_reachable()
            && self.mtu.as_ref().is_none_or(MtuProbe::is_adequate)
    }
}

/// Everything that happened to one device during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    pub host: HostEntry,
    pub role: Role,
    pub status: DeviceStatus,
    pub steps: Vec<StepResult>,
    /// Transport the session actually used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    /// Set when no session could be opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<GatewayProbe>,
    pub finished_at: DateTime<Utc>,
}

impl DeviceOutcome {
    /// Outcome of a completed device pass; status derives from the steps.
    pub fn completed(host: HostEntry, role: Role, steps: Vec<StepResult>) -> Self {
        Self {
            status: DeviceStatus::from_steps(&steps),
            host,
            role,
            steps,
            transport: None,
            connection_error: None,
            probe: None,
            finished_at: Utc::now(),
        }
    }

    /// The device could not be reached; nothing was attempted.
    pub fn unreachable(host: HostEntry, role: Role, error: impl Into<String>) -> Self {
        Self {
            host,
            role,
            status: DeviceStatus::Failed,
            steps: Vec::new(),
            transport: None,
            connection_error: Some(error.into()),
            probe: None,
            finished_at: Utc::now(),
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_probe(mut self, probe: Option<GatewayProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_success_without_failures() {
        let steps = vec![
            StepResult::applied("address"),
            StepResult::already_present("route"),
            StepResult::skipped("tunnel l2tp-x", "no mapping for tunnel"),
        ];
        assert_eq!(DeviceStatus::from_steps(&steps), DeviceStatus::Success);
        assert_eq!(DeviceStatus::from_steps(&[]), DeviceStatus::Success);
    }

    #[test]
    fn status_is_partial_when_some_steps_took_effect() {
        let steps = vec![
            StepResult::applied("address"),
            StepResult::failed("route", "failure: bad gateway"),
        ];
        assert_eq!(DeviceStatus::from_steps(&steps), DeviceStatus::Partial);
    }

    #[test]
    fn status_is_failed_when_every_attempted_step_failed() {
        let steps = vec![
            StepResult::failed("bridge", "not found"),
            StepResult::skipped("address", "bridge unavailable"),
            StepResult::failed("default route", "conflict"),
        ];
        assert_eq!(DeviceStatus::from_steps(&steps), DeviceStatus::Failed);
    }

    #[test]
    fn outcomes_serialize_in_screaming_case() {
        assert_eq!(StepOutcome::AlreadyPresent.to_string(), "ALREADY_PRESENT");
        assert_eq!(DeviceStatus::Partial.to_string(), "PARTIAL");
    }

    fn answered(target: &str) -> PingSummary {
        PingSummary {
            target: target.into(),
            sent: 4,
            received: 4,
            loss_percent: 0,
            avg_rtt_ms: Some(1.0),
            error: None,
        }
    }

    #[test]
    fn connectivity_needs_one_external_target_and_a_usable_mtu() {
        let mut probe = GatewayProbe {
            gateway: answered("2804::11"),
            external: vec![
                PingSummary::failed("2001:4860:4860::8888", "timeout"),
                answered("2001:4860:4860::8844"),
            ],
            mtu: None,
        };
        assert!(probe.all_ok());

        probe.mtu = Some(MtuProbe {
            largest_ok: None,
            first_failed: Some(1280),
            tested: vec![1280],
        });
        assert!(!probe.all_ok());

        probe.mtu = Some(MtuProbe {
            largest_ok: Some(1400),
            first_failed: Some(1500),
            tested: vec![1280, 1300, 1400, 1500],
        });
        assert!(probe.all_ok());

        probe.external.truncate(1);
        assert!(!probe.external_reachable());
    }
}
