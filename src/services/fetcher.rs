use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;

/// How much of a rejected response body is kept for diagnostics.
const BODY_PREVIEW_CHARS: usize = 200;

/// Bytes read from a rejected response to build the preview.
const BODY_PREVIEW_BYTES: usize = 4 * 1024;

/// Default cap on a downloaded image.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// A downloaded input image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Downloads input images by URL, rejecting anything that is not `image/*`.
#[derive(Clone)]
pub struct MediaFetcher {
    http: Client,
    max_bytes: usize,
}

impl MediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Refuse images larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        if !content_type.starts_with("image/") {
            let body = String::from_utf8_lossy(&read_prefix(response, BODY_PREVIEW_BYTES).await)
                .into_owned();
            tracing::warn!(
                url,
                content_type = %content_type,
                body = %truncate(&body, BODY_PREVIEW_CHARS),
                "Input URL did not return an image"
            );
            return Err(FetchError::InvalidContentType {
                got: content_type,
                body_preview: truncate(&body, BODY_PREVIEW_CHARS),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let bytes = self.read_capped(url, response).await?;

        tracing::debug!(url, content_type = %content_type, size = bytes.len(), "Image downloaded");

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }

    /// Read the body chunk by chunk, giving up once it passes `max_bytes`.
    /// Covers responses without a `Content-Length`.
    async fn read_capped(&self, url: &str, mut response: Response) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Up to roughly `limit` leading bytes of the body; read errors end it early.
async fn read_prefix(mut response: Response, limit: usize) -> Vec<u8> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            _ => break,
        }
    }
    body.truncate(limit);
    body
}

/// `image/jpeg; charset=binary` -> `image/jpeg`
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP client setup failed: {0}")]
    Client(reqwest::Error),

    #[error("download failed for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download failed: HTTP {status} for {url}")]
    DownloadFailed { url: String, status: u16 },

    #[error("invalid content type '{got}' (expected image/*): {body_preview}")]
    InvalidContentType { got: String, body_preview: String },

    #[error("download failed: {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}
