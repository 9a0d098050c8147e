use regex::Regex;
use std::sync::OnceLock;

fn verb_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(run|verify|reproduce|establish|capture|inspect)\b").expect("static regex")
    })
}

fn target_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(tests?|baseline|log|output)\b").expect("static regex"))
}

fn package_manager_invocation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(pnpm|npm|yarn|bun|turbo)\s+(test|build|lint|typecheck|check|format)\b")
            .expect("static regex")
    })
}

/// True when a step's instruction describes a diagnostic/no-op action
/// rather than a code change, spec.md §4.7: either a verb/target
/// combination (`run the tests`, `inspect the baseline log`) or an explicit
/// package-manager invocation (`pnpm test`). A step like this producing no
/// diff is success, not a parse failure.
pub fn is_diagnostic_step(instruction: &str) -> bool {
    if package_manager_invocation().is_match(instruction) {
        return true;
    }
    verb_pattern().is_match(instruction) && target_pattern().is_match(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_and_target_combination_is_diagnostic() {
        assert!(is_diagnostic_step("Run the tests to establish a baseline"));
        assert!(is_diagnostic_step("Inspect the output log for the failing case"));
    }

    #[test]
    fn explicit_package_manager_invocation_is_diagnostic() {
        assert!(is_diagnostic_step("Invoke `pnpm test` to confirm the regression"));
        assert!(is_diagnostic_step("run turbo lint across the workspace"));
    }

    #[test]
    fn plain_code_change_instruction_is_not_diagnostic() {
        assert!(!is_diagnostic_step("Add a null check to the parser's entry point"));
    }

    #[test]
    fn verb_without_target_is_not_diagnostic() {
        assert!(!is_diagnostic_step("Run the new migration script"));
    }
}
