use conductor_types::StepExecutionState;

/// N₁/N₂ from spec.md §4.7: consecutive-invalid-diff and
/// consecutive-apply-failure thresholds, past which the engine escalates
/// instead of retrying the same step again.
#[derive(Debug, Clone, Copy)]
pub struct EscalationThresholds {
    pub invalid_diff: u32,
    pub apply_failure: u32,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            invalid_diff: 2,
            apply_failure: 3,
        }
    }
}

/// What the engine does next after a step attempt, spec.md §4.7's
/// `{advance | repair | escalate | terminate}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decision {
    Advance,
    Repair,
    Escalate,
    Terminate,
}

/// Pure decision function over the engine's step-execution state, mirroring
/// `aivcs-core::self_healing::decide_action`'s shape (typed state in, typed
/// action out, no side effects). `repeated_failure_signature` is true when
/// the current verification failure signature matches the previous one —
/// spec.md §4.7's "failure signature continuity" that turns a would-be
/// retry into an escalation because the step isn't making progress.
pub fn decide_after_failure(
    state: &StepExecutionState,
    thresholds: EscalationThresholds,
    repeated_failure_signature: bool,
) -> Decision {
    if state.should_escalate(thresholds.invalid_diff, thresholds.apply_failure) {
        return Decision::Escalate;
    }
    if repeated_failure_signature {
        return Decision::Escalate;
    }
    Decision::Repair
}

/// Whether a planner escalation (re-plan) still has room, or the run should
/// terminate instead. The engine gives each escalation one re-plan attempt;
/// a second consecutive escalation for the same step family terminates.
pub fn decide_on_escalation(escalations_used: u32, max_escalations: u32) -> Decision {
    if escalations_used < max_escalations {
        Decision::Escalate
    } else {
        Decision::Terminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_with_new_signature_repairs() {
        let mut state = StepExecutionState::new();
        state.record_invalid_diff();
        let decision = decide_after_failure(&state, EscalationThresholds::default(), false);
        assert_eq!(decision, Decision::Repair);
    }

    #[test]
    fn at_threshold_escalates_regardless_of_signature() {
        let mut state = StepExecutionState::new();
        state.record_invalid_diff();
        state.record_invalid_diff();
        let decision = decide_after_failure(&state, EscalationThresholds::default(), false);
        assert_eq!(decision, Decision::Escalate);
    }

    #[test]
    fn repeated_signature_escalates_before_threshold() {
        let mut state = StepExecutionState::new();
        state.record_apply_failure("sig-a".into());
        let decision = decide_after_failure(&state, EscalationThresholds::default(), true);
        assert_eq!(decision, Decision::Escalate);
    }

    #[test]
    fn escalation_budget_exhausted_terminates() {
        assert_eq!(decide_on_escalation(1, 1), Decision::Terminate);
        assert_eq!(decide_on_escalation(0, 1), Decision::Escalate);
    }
}
