//! Device status vocabulary and normalization of agent-reported values.

pub const APPLIED: &str = "applied";
pub const ERROR: &str = "error";
pub const PENDING: &str = "pending";
pub const DEACTIVATING: &str = "deactivating";

/// Map whatever string an agent reports onto the internal vocabulary.
/// Unrecognized values fall back to pending.
pub fn normalize(reported: &str) -> &'static str {
    match reported.trim().to_lowercase().as_str() {
        "running" | "applied" | "ok" | "success" => APPLIED,
        "error" | "failed" | "rollbacked" => ERROR,
        "deactivating" => DEACTIVATING,
        _ => PENDING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_success_spellings() {
        for s in ["running", "applied", "ok", "success", "Running", " OK "] {
            assert_eq!(normalize(s), APPLIED);
        }
    }

    #[test]
    fn maps_failure_spellings() {
        for s in ["error", "failed", "rollbacked"] {
            assert_eq!(normalize(s), ERROR);
        }
    }

    #[test]
    fn keeps_deactivating() {
        assert_eq!(normalize("deactivating"), DEACTIVATING);
    }

    #[test]
    fn unknown_falls_back_to_pending() {
        assert_eq!(normalize(""), PENDING);
        assert_eq!(normalize("rebooting"), PENDING);
    }
}
