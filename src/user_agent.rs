//! Shared User-Agent string for harvester HTTP traffic.
//!
//! Single source for project URL and UA format so every request made by this
//! tool is easy to identify and update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/harvester";

/// Default User-Agent for search API requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (batch-harvest-tool; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_contains_version_and_project_url() {
        let ua = default_user_agent();
        assert!(
            ua.contains(PROJECT_UA_URL),
            "UA must contain project URL: {ua}"
        );
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("harvester/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }
}
