//! Transcript fetcher.
//!
//! Downloads the raw transcript behind one session identifier and normalises
//! it to plain text: HTML pages go through the Markdown converter, WebVTT
//! captions are flattened to their spoken lines, anything else is used as-is.
//! Every non-success condition surfaces as [`WgDigestError::Unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use wgdigest_shared::{ContentFetcher, ItemId, Result, SourceConfig, WgDigestError};

/// Maximum number of redirects to follow for one transcript.
const MAX_REDIRECTS: usize = 5;

/// Shape of a downloaded transcript body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Html,
    WebVtt,
    Text,
}

impl TranscriptFormat {
    /// Guess the format from the response content type, falling back to a body sniff.
    pub fn detect(content_type: Option<&str>, body: &str) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        let head = body.trim_start();

        if content_type.contains("text/vtt") || head.starts_with("WEBVTT") {
            Self::WebVtt
        } else if content_type.contains("html")
            || head.starts_with("<!DOCTYPE")
            || head.starts_with("<!doctype")
            || head.starts_with("<html")
        {
            Self::Html
        } else {
            Self::Text
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptFetcher
// ---------------------------------------------------------------------------

/// [`ContentFetcher`] that downloads session transcripts over HTTP.
#[derive(Debug, Clone)]
pub struct TranscriptFetcher {
    client: Client,
    config: SourceConfig,
}

impl TranscriptFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WgDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ContentFetcher for TranscriptFetcher {
    #[instrument(skip(self), fields(%item_id))]
    async fn fetch(&self, item_id: &ItemId) -> Result<String> {
        let url = self.config.transcript_url_for(item_id);
        debug!(%url, "fetching transcript");

        let unavailable = |reason: String| WgDigestError::Unavailable(format!("{item_id}: {reason}"));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("body read failed: {e}")))?;

        let text = match TranscriptFormat::detect(content_type.as_deref(), &body) {
            TranscriptFormat::Html => wgdigest_markdown::html_to_text(&body)
                .map_err(|e| unavailable(e.to_string()))?,
            TranscriptFormat::WebVtt => wgdigest_markdown::captions_to_text(&body),
            TranscriptFormat::Text => body,
        };

        if text.trim().is_empty() {
            return Err(unavailable("empty transcript".into()));
        }

        debug!(chars = text.len(), "transcript fetched");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ID: &str = "IETF121-QUIC-20241105-1300";

    async fn fetcher_for(server: &MockServer) -> TranscriptFetcher {
        let config = SourceConfig {
            transcript_url: format!("{}/transcripts/{{item_id}}.txt", server.uri()),
            ..SourceConfig::default()
        };
        TranscriptFetcher::new(&config).unwrap()
    }

    async fn serve(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/transcripts/{ID}.txt")))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn plain_text_is_used_verbatim() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200).set_body_string("Chair: welcome to QUIC.\n"),
        )
        .await;

        let text = fetcher_for(&server).await.fetch(&ItemId::new(ID)).await.unwrap();
        assert_eq!(text, "Chair: welcome to QUIC.\n");
    }

    #[tokio::test]
    async fn html_is_converted() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(
                    "<html><body><main><p>Chair: <b>welcome</b></p></main></body></html>",
                ),
        )
        .await;

        let text = fetcher_for(&server).await.fetch(&ItemId::new(ID)).await.unwrap();
        assert!(text.contains("welcome"));
        assert!(!text.contains("<p>"));
    }

    #[tokio::test]
    async fn missing_transcript_is_unavailable() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(404)).await;

        let err = fetcher_for(&server)
            .await
            .fetch(&ItemId::new(ID))
            .await
            .unwrap_err();
        assert!(matches!(err, WgDigestError::Unavailable(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn empty_body_is_unavailable() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(200).set_body_string("  \n ")).await;

        let err = fetcher_for(&server)
            .await
            .fetch(&ItemId::new(ID))
            .await
            .unwrap_err();
        assert!(matches!(err, WgDigestError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        let config = SourceConfig {
            transcript_url: "http://127.0.0.1:9/{item_id}".into(),
            timeout_secs: 2,
            ..SourceConfig::default()
        };
        let fetcher = TranscriptFetcher::new(&config).unwrap();
        let err = fetcher.fetch(&ItemId::new(ID)).await.unwrap_err();
        assert!(matches!(err, WgDigestError::Unavailable(_)));
    }

    #[test]
    fn format_detection() {
        assert_eq!(
            TranscriptFormat::detect(Some("text/vtt"), "00:00"),
            TranscriptFormat::WebVtt
        );
        assert_eq!(
            TranscriptFormat::detect(None, "WEBVTT\n\n1\n"),
            TranscriptFormat::WebVtt
        );
        assert_eq!(
            TranscriptFormat::detect(None, "  <!DOCTYPE html><html></html>"),
            TranscriptFormat::Html
        );
        assert_eq!(
            TranscriptFormat::detect(Some("text/plain"), "hello"),
            TranscriptFormat::Text
        );
    }
}
