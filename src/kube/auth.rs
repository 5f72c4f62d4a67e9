//! API server authentication
//!
//! Bearer tokens come from an explicit value, a token file, or the in-cluster
//! service account mount. File tokens are re-read after a TTL because
//! projected service account tokens rotate.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token mounted into every pod running under a service account
pub const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// How long a token read from disk is reused before re-reading the file
const TOKEN_FILE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum TokenSource {
    Anonymous,
    Static(String),
    File(PathBuf),
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Bearer credentials with file-token caching
#[derive(Clone)]
pub struct KubeCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl KubeCredentials {
    /// Resolve credentials: explicit token, then token file, then the
    /// in-cluster mount if present, else anonymous.
    pub fn resolve(token: Option<String>, token_file: Option<PathBuf>) -> Self {
        let source = match (token, token_file) {
            (Some(token), _) if !token.trim().is_empty() => TokenSource::Static(token.trim().to_string()),
            (_, Some(path)) => TokenSource::File(path),
            _ if Path::new(IN_CLUSTER_TOKEN_PATH).exists() => {
                tracing::debug!("Using in-cluster service account token");
                TokenSource::File(PathBuf::from(IN_CLUSTER_TOKEN_PATH))
            }
            _ => {
                tracing::warn!("No API token configured, sending anonymous requests");
                TokenSource::Anonymous
            }
        };

        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            source: TokenSource::Anonymous,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the bearer token for the next request, if any
    pub async fn get_token(&self) -> Result<Option<String>> {
        let path = match &self.source {
            TokenSource::Anonymous => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::File(path) => path,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(Some(cached.token.clone()));
                }
                tracing::debug!("Cached token expired, re-reading {}", path.display());
            }
        }

        let token = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read token file {}", path.display()))?
            .trim()
            .to_string();

        if token.is_empty() {
            anyhow::bail!("Token file {} is empty", path.display());
        }

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + TOKEN_FILE_TTL,
            });
        }

        Ok(Some(token))
    }
}
