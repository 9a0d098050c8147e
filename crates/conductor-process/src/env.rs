use std::collections::BTreeMap;

/// Baseline variables useful for CLI configuration discovery, spec.md §4.1.
/// Nothing else from the parent's environment reaches the child; this is
/// the sole isolation mechanism the supervisor provides.
const BASELINE_VARS: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "TERM",
    "COLORTERM",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    "TMP",
    "TEMP",
    "XDG_CONFIG_HOME",
    "XDG_CACHE_HOME",
    "XDG_DATA_HOME",
    "PATH",
];

/// Builder for a child's environment: baseline ∪ caller allowlist ∪ caller
/// overrides. Overrides win over allowlisted pass-through values of the
/// same name.
#[derive(Debug, Clone, Default)]
pub struct EnvPolicy {
    allowlist: Vec<String>,
    overrides: BTreeMap<String, String>,
}

impl EnvPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.allowlist.push(name.into());
        self
    }

    pub fn allow_all(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowlist.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    /// Resolves the final environment from the current process's
    /// environment plus `self`'s allowlist/overrides.
    pub fn build(&self) -> BTreeMap<String, String> {
        self.build_from(|name| std::env::var(name).ok())
    }

    fn build_from(&self, lookup: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for name in BASELINE_VARS {
            if let Some(value) = lookup(name) {
                env.insert((*name).to_string(), value);
            }
        }
        for name in &self.allowlist {
            if let Some(value) = lookup(name) {
                env.insert(name.clone(), value);
            }
        }
        for (name, value) in &self.overrides {
            env.insert(name.clone(), value.clone());
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_parent_env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/tester".into()),
            "PATH" => Some("/usr/bin".into()),
            "SECRET_TOKEN" => Some("should-not-leak".into()),
            "CUSTOM_ALLOWED" => Some("visible".into()),
            _ => None,
        }
    }

    #[test]
    fn baseline_vars_pass_through() {
        let env = EnvPolicy::new().build_from(fake_parent_env);
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/tester"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[test]
    fn non_allowlisted_vars_are_dropped() {
        let env = EnvPolicy::new().build_from(fake_parent_env);
        assert!(!env.contains_key("SECRET_TOKEN"));
    }

    #[test]
    fn allowlisted_vars_pass_through() {
        let env = EnvPolicy::new()
            .allow("CUSTOM_ALLOWED")
            .build_from(fake_parent_env);
        assert_eq!(env.get("CUSTOM_ALLOWED").map(String::as_str), Some("visible"));
    }

    #[test]
    fn overrides_win_over_allowlist() {
        let env = EnvPolicy::new()
            .allow("CUSTOM_ALLOWED")
            .set("CUSTOM_ALLOWED", "overridden")
            .build_from(fake_parent_env);
        assert_eq!(env.get("CUSTOM_ALLOWED").map(String::as_str), Some("overridden"));
    }

    #[test]
    fn overrides_can_introduce_new_vars() {
        let env = EnvPolicy::new()
            .set("RUN_ID", "run-1")
            .build_from(fake_parent_env);
        assert_eq!(env.get("RUN_ID").map(String::as_str), Some("run-1"));
    }
}
