//! HTTP utilities for Kubernetes REST API calls

use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a response body and strip control characters before logging it
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Transport options for the API server connection
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM bundle to trust in addition to the system roots
    pub ca_file: Option<std::path::PathBuf>,
    /// Skip certificate verification entirely
    pub insecure: bool,
}

/// HTTP client wrapper for API server calls
#[derive(Clone)]
pub struct KubeHttpClient {
    client: Client,
}

impl KubeHttpClient {
    pub fn new(timeout: Duration, tls: &TlsOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(format!("vmsnap/{}", crate::VERSION))
            .timeout(timeout);

        if let Some(ca_file) = &tls.ca_file {
            builder = builder.add_root_certificate(load_certificate(ca_file)?);
        }
        if tls.insecure {
            tracing::warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// GET a JSON document. `resource` names the object in errors and logs.
    pub async fn get(
        &self,
        url: &str,
        token: Option<&str>,
        resource: &str,
    ) -> Result<Value, FetchError> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            resource: resource.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| FetchError::Transport {
            resource: resource.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("{} not found", resource);
            return Err(FetchError::NotFound {
                resource: resource.to_string(),
            });
        }

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(FetchError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            resource: resource.to_string(),
            message: e.to_string(),
        })
    }
}

fn load_certificate(path: &Path) -> Result<reqwest::Certificate> {
    let pem = std::fs::read(path)
        .with_context(|| format!("Failed to read CA bundle {}", path.display()))?;
    reqwest::Certificate::from_pem(&pem)
        .with_context(|| format!("Invalid CA bundle {}", path.display()))
}
