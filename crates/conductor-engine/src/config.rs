use std::time::Duration;

use conductor_retry::RetrySchedule;
use conductor_verify::VerificationProfile;

use crate::decision::EscalationThresholds;

/// Caller-constructed run configuration — spec.md §1 scopes configuration
/// file loading/schema validation out of this crate; this struct is what a
/// loaded config is expected to resolve to before reaching the engine.
#[derive(Clone)]
pub struct RunEngineConfig {
    pub thresholds: EscalationThresholds,
    /// How many times the engine will re-enter the planner on escalation
    /// before terminating the run outright.
    pub max_escalations: u32,
    pub max_steps: u32,
    pub per_call_timeout: Duration,
    pub retry_schedule: RetrySchedule,
    pub verification_profile: VerificationProfile,
}

impl Default for RunEngineConfig {
    fn default() -> Self {
        Self {
            thresholds: EscalationThresholds::default(),
            max_escalations: 1,
            max_steps: 50,
            per_call_timeout: Duration::from_secs(120),
            retry_schedule: RetrySchedule::default(),
            verification_profile: VerificationProfile::default(),
        }
    }
}
