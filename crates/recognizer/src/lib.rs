//! HTTP recognition service client.
//!
//! Sends one page raster per request as a base64 PNG inside a JSON body and
//! reads the recognized text back from a JSON response:
//!
//! ```text
//! POST <endpoint>
//! { "image": "<base64 png>", "mime_type": "image/png", "language": "eng" }
//!
//! 200 OK
//! { "text": "..." }
//! ```
//!
//! There is no retry and no timeout; a failed call is reported as-is.

use base64::{engine::general_purpose::STANDARD, Engine};
use doc_model::{Raster, RecognitionError, RecognitionService};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

const PNG_MIME: &str = "image/png";

#[derive(Debug, Serialize)]
struct RecognitionRequest<'a> {
    image: String,
    mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    text: String,
}

/// Recognition service reached over HTTP
#[derive(Clone)]
pub struct HttpRecognizer {
    endpoint: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRecognizer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), api_key: None, agent: ureq::agent() }
    }

    /// Send `key` as a bearer token
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the bearer token from environment variable `var`, if set
    pub fn with_api_key_from_env(self, var: &str) -> Self {
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => self.with_api_key(key),
            _ => {
                log::warn!("{var} is not set; calling the recognition service without a key");
                self
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// PNG-encode a raster
pub fn encode_png(raster: &Raster) -> Result<Vec<u8>, RecognitionError> {
    let mut png = Vec::new();
    raster
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| RecognitionError::Encode(e.to_string()))?;
    Ok(png)
}

fn request_body(raster: &Raster, language: Option<&str>) -> Result<String, RecognitionError> {
    let request = RecognitionRequest {
        image: STANDARD.encode(encode_png(raster)?),
        mime_type: PNG_MIME,
        language,
    };
    serde_json::to_string(&request).map_err(|e| RecognitionError::Encode(e.to_string()))
}

fn parse_response(body: &str) -> Result<String, RecognitionError> {
    serde_json::from_str::<RecognitionResponse>(body)
        .map(|response| response.text)
        .map_err(|e| RecognitionError::MalformedResponse(e.to_string()))
}

impl RecognitionService for HttpRecognizer {
    fn recognize(
        &self,
        raster: &Raster,
        language_hint: Option<&str>,
    ) -> Result<String, RecognitionError> {
        let body = request_body(raster, language_hint)?;
        log::debug!(
            "POST {} ({}x{} raster, {} byte body)",
            self.endpoint,
            raster.width(),
            raster.height(),
            body.len()
        );

        let mut request =
            self.agent.post(&self.endpoint).set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = request.send_string(&body).map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                RecognitionError::Transport(format!("{} returned HTTP {code}", self.endpoint))
            }
            other => RecognitionError::Transport(other.to_string()),
        })?;

        let text = response
            .into_string()
            .map_err(|e| RecognitionError::MalformedResponse(e.to_string()))?;

        parse_response(&text)
    }
}
