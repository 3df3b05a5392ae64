pub mod embedder;
pub mod llm;

/// Resolve a provider credential: explicit config wins, then the environment.
pub(crate) fn credential(explicit: Option<&str>, env_var: &str) -> Option<String> {
    match explicit {
        Some(key) if !key.is_empty() => Some(key.to_string()),
        _ => std::env::var(env_var).ok().filter(|v| !v.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VAR: &str = "ATTEST_TEST_API_KEY";

    #[test]
    #[serial]
    fn explicit_credential_wins_over_environment() {
        std::env::set_var(VAR, "from-env");
        assert_eq!(credential(Some("explicit"), VAR).as_deref(), Some("explicit"));
        std::env::remove_var(VAR);
    }

    #[test]
    #[serial]
    fn empty_explicit_credential_falls_back_to_environment() {
        std::env::set_var(VAR, "from-env");
        assert_eq!(credential(Some(""), VAR).as_deref(), Some("from-env"));
        std::env::remove_var(VAR);
        assert_eq!(credential(Some(""), VAR), None);
    }

    #[test]
    #[serial]
    fn empty_environment_value_counts_as_absent() {
        std::env::set_var(VAR, "");
        assert_eq!(credential(None, VAR), None);
        std::env::remove_var(VAR);
    }
}
