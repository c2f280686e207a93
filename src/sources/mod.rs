//! Upstream HTTP plumbing: shared client, header profiles, and body helpers.

use std::borrow::Cow;
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

use crate::error::LactError;

pub(crate) mod fetch;
pub(crate) mod rate_limit;
pub(crate) mod search;

pub(crate) const DEFAULT_BASE: &str = "https://e-lactancia.org";
pub(crate) const BASE_ENV: &str = "LACTAMED_BASE";
pub(crate) const SEARCH_PATH: &str = "megasearch";

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// The upstream serves a degraded page tier to obvious bots, so requests
/// carry a stock desktop browser identity.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Expected content family of a request, reflected in the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderProfile {
    Html,
    Json,
}

impl HeaderProfile {
    pub(crate) fn accept(&self) -> &'static str {
        match self {
            HeaderProfile::Html => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
            }
            HeaderProfile::Json => "application/json, text/javascript, */*; q=0.01",
        }
    }
}

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

/// Builds the HTTP client used for all upstream traffic.
///
/// - Total timeout: 8s; connect timeout: 5s (politeness over exhaustiveness)
/// - Browser-emulating identity headers
/// - No retry middleware: a failed candidate URL is never retried
pub(crate) fn build_client() -> Result<reqwest::Client, LactError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    reqwest::Client::builder()
        .timeout(Duration::from_secs(8))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(default_headers)
        .build()
        .map_err(LactError::HttpClientInit)
}

pub(crate) fn body_excerpt(body: &str) -> String {
    let truncated: &str = if body.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    } else {
        body
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if body.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}
