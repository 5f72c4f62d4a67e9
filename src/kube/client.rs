//! Kubernetes Client
//!
//! Combines credentials and HTTP into a [`ResourceClient`] for the API server.

use super::auth::KubeCredentials;
use super::http::{KubeHttpClient, TlsOptions};
use crate::error::FetchError;
use crate::resource::fetcher::ResourceClient;
use crate::resource::registry::FetchRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Page size used when listing collections
const LIST_PAGE_SIZE: u32 = 500;

/// Main API server client
#[derive(Clone)]
pub struct KubeClient {
    pub credentials: KubeCredentials,
    pub http: KubeHttpClient,
    server: Url,
}

impl KubeClient {
    pub fn new(
        server: &str,
        credentials: KubeCredentials,
        timeout: Duration,
        tls: &TlsOptions,
    ) -> Result<Self> {
        let server = Url::parse(server)
            .with_context(|| format!("Invalid API server URL: {server}"))?;
        if server.cannot_be_a_base() {
            anyhow::bail!("API server URL cannot be used as a base: {server}");
        }

        let http = KubeHttpClient::new(timeout, tls)?;
        Ok(Self {
            credentials,
            http,
            server,
        })
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// Build the URL for a request: `{server}/{path}[/namespaces/{ns}]/{kind}[/{name}]`
    pub fn resource_url(&self, request: &FetchRequest) -> String {
        let mut url = format!(
            "{}/{}",
            self.server.as_str().trim_end_matches('/'),
            request.path.trim_matches('/')
        );

        if let Some(ns) = &request.namespace {
            url.push_str("/namespaces/");
            url.push_str(&urlencoding::encode(ns));
        }
        url.push('/');
        url.push_str(&request.kind);

        if let Some(name) = &request.name {
            url.push('/');
            url.push_str(&urlencoding::encode(name));
        }

        url
    }

    async fn token(&self, request: &FetchRequest) -> Result<Option<String>, FetchError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| FetchError::Transport {
                resource: request.to_string(),
                message: format!("{e:#}"),
            })
    }

    /// List a collection, following `continue` tokens until exhausted.
    ///
    /// Pages are merged into the first response's `items`.
    async fn list_all(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let token = self.token(request).await?;
        let base = self.resource_url(request);
        let resource = request.to_string();

        let mut merged: Option<Value> = None;
        let mut continue_token: Option<String> = None;

        loop {
            let url = page_url(&base, continue_token.as_deref());
            let mut page = self.http.get(&url, token.as_deref(), &resource).await?;

            continue_token = page
                .pointer("/metadata/continue")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            match merged.as_mut() {
                None => merged = Some(page),
                Some(first) => {
                    let items = page
                        .get_mut("items")
                        .and_then(|v| v.as_array_mut())
                        .map(std::mem::take)
                        .unwrap_or_default();
                    if let Some(Value::Array(all)) = first.get_mut("items") {
                        all.extend(items);
                    }
                }
            }

            if continue_token.is_none() {
                break;
            }
            tracing::debug!("Fetching next page of {}", resource);
        }

        let mut merged = merged.unwrap_or(Value::Null);
        if let Some(metadata) = merged.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            metadata.remove("continue");
        }
        Ok(merged)
    }
}

fn page_url(base: &str, continue_token: Option<&str>) -> String {
    match continue_token {
        Some(token) => format!(
            "{}?limit={}&continue={}",
            base,
            LIST_PAGE_SIZE,
            urlencoding::encode(token)
        ),
        None => format!("{}?limit={}", base, LIST_PAGE_SIZE),
    }
}

#[async_trait]
impl ResourceClient for KubeClient {
    async fn get(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        if request.is_list() {
            return self.list_all(request).await;
        }

        let token = self.token(request).await?;
        let url = self.resource_url(request);
        self.http
            .get(&url, token.as_deref(), &request.to_string())
            .await
    }
}
