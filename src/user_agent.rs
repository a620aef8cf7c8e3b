//! User-Agent string sent with every download request.
//!
//! Content mirrors log by agent, so the header names the tool and its
//! version.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/hdvtdev/launcher-fetch";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("launcher-fetch/{version} (+{PROJECT_UA_URL})")
}
