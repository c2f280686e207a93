//! Single-GET document fetcher with status classification.
//!
//! A non-2xx status or a transport error is a hard failure for that specific
//! URL: the caller moves on to its next candidate instead of retrying.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::sources::rate_limit::RateGovernor;
use crate::sources::{HeaderProfile, MAX_BODY_BYTES, body_excerpt};

/// Why one candidate URL failed. Never fatal for the overall query while
/// other candidates remain.
#[derive(Debug)]
pub(crate) enum FetchError {
    /// Upstream answered with a non-2xx status.
    NotFound { status: StatusCode, excerpt: String },
    /// Timeout, DNS failure, connection reset, or a failed body read.
    Transport(reqwest::Error),
    /// Body exceeded the read cap; treated like any other hard failure.
    BodyTooLarge { limit: usize },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound { status, excerpt } if excerpt.is_empty() => {
                write!(f, "upstream returned HTTP {status}")
            }
            FetchError::NotFound { status, excerpt } => {
                write!(f, "upstream returned HTTP {status}: {excerpt}")
            }
            FetchError::Transport(err) => write!(f, "transport failure: {err}"),
            FetchError::BodyTooLarge { limit } => {
                write!(f, "response body exceeded {limit} bytes")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct FetchedDocument {
    pub(crate) body: String,
    pub(crate) content_type: Option<String>,
}

impl FetchedDocument {
    /// Media type without parameters, lowercased, e.g. `application/json`.
    pub(crate) fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }
}

/// Fetches one candidate URL, waiting on the rate governor first.
///
/// Returns the body as text only for 2xx responses.
pub(crate) async fn fetch_document(
    client: &reqwest::Client,
    governor: &RateGovernor,
    url: &str,
    profile: HeaderProfile,
) -> Result<FetchedDocument, FetchError> {
    governor.wait().await;

    let resp = client
        .get(url)
        .header(ACCEPT, profile.accept())
        .send()
        .await
        .map_err(FetchError::Transport)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::NotFound {
            status,
            excerpt: body_excerpt(&body),
        });
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut resp = resp;
    let mut raw: Vec<u8> = Vec::new();
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                if raw.len().saturating_add(chunk.len()) > MAX_BODY_BYTES {
                    return Err(FetchError::BodyTooLarge {
                        limit: MAX_BODY_BYTES,
                    });
                }
                raw.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(err) => return Err(FetchError::Transport(err)),
        }
    }

    Ok(FetchedDocument {
        body: String::from_utf8_lossy(&raw).into_owned(),
        content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn governor() -> RateGovernor {
        RateGovernor::new(std::time::Duration::from_millis(1))
    }

    #[tokio::test]
    async fn fetch_returns_body_and_content_type_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/ibuprofen/product/"))
            // wiremock splits comma-separated header values, so the expected
            // Accept value must be passed as its comma-separated parts.
            .and(headers(
                "accept",
                HeaderProfile::Html.accept().split(',').collect::<Vec<_>>(),
            ))
            .respond_with(
                // set_body_string would pin the content-type to text/plain;
                // set_body_raw carries the intended content-type instead.
                ResponseTemplate::new(200).set_body_raw(
                    "<html><h1>Ibuprofen</h1></html>",
                    "text/html; charset=utf-8",
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/breastfeeding/ibuprofen/product/", server.uri());
        let doc = fetch_document(&client, &governor(), &url, HeaderProfile::Html)
            .await
            .expect("fetch should succeed");

        assert!(doc.body.contains("Ibuprofen"));
        assert_eq!(doc.media_type().as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn fetch_classifies_non_2xx_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/breastfeeding/nosuchdrug/product/"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/breastfeeding/nosuchdrug/product/", server.uri());
        let err = fetch_document(&client, &governor(), &url, HeaderProfile::Html)
            .await
            .expect_err("404 should be a hard failure");

        assert!(matches!(
            err,
            FetchError::NotFound {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fetch_does_not_retry_a_failed_url() {
        let server = MockServer::start().await;
        // expect(1) fails the test if the fetcher issues a second request.
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.uri());
        let err = fetch_document(&client, &governor(), &url, HeaderProfile::Json)
            .await
            .expect_err("500 should be a hard failure");
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_classifies_connection_failure_as_transport() {
        let client = reqwest::Client::new();
        // Port 9 (discard) is not listening in the test environment.
        let err = fetch_document(
            &client,
            &governor(),
            "http://127.0.0.1:9/breastfeeding/x/product/",
            HeaderProfile::Html,
        )
        .await
        .expect_err("connection refused should be a transport failure");

        assert!(matches!(err, FetchError::Transport(_)));
    }
}
