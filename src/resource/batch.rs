//! Batch Executor
//!
//! Runs many independent reads with a concurrency ceiling, consulting and
//! populating the shared [`ResponseCache`].

use super::cache::ResponseCache;
use super::fetcher::ResourceClient;
use super::registry::FetchRequest;
use crate::error::FetchError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Concurrency used when a caller passes zero
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Outcome of one request in a batch
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub id: String,
    pub outcome: Result<Arc<Value>, FetchError>,
}

impl FetchResult {
    pub fn payload(&self) -> Option<&Arc<Value>> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }
}

/// Bounded-concurrency executor over a [`ResourceClient`]
#[derive(Clone)]
pub struct BatchExecutor {
    client: Arc<dyn ResourceClient>,
    cache: Arc<ResponseCache>,
}

impl BatchExecutor {
    pub fn new(client: Arc<dyn ResourceClient>, cache: Arc<ResponseCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Execute every request, at most `max_concurrency` at a time.
    ///
    /// `result[i]` always answers `requests[i]`. A failing request never
    /// affects its siblings. Requests still queued when `cancel` fires
    /// resolve to [`FetchError::Cancelled`]; in-flight ones run to completion.
    pub async fn execute_batch(
        &self,
        requests: Vec<FetchRequest>,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<FetchResult> {
        let width = if max_concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            max_concurrency
        };

        tracing::debug!("Executing batch of {} requests (concurrency {})", requests.len(), width);

        let ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let mut slots: Vec<Option<FetchResult>> = vec![None; requests.len()];
        let semaphore = Arc::new(Semaphore::new(width));
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let executor = self.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let outcome = match permit {
                    Some(_permit) => executor.resolve(&request).await,
                    None => Err(FetchError::Cancelled {
                        resource: request.to_string(),
                    }),
                };

                (index, FetchResult { id: request.id, outcome })
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!("Batch worker failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| FetchResult {
                    outcome: Err(FetchError::Transport {
                        resource: id.clone(),
                        message: "worker aborted".to_string(),
                    }),
                    id,
                })
            })
            .collect()
    }

    /// Fetch a single resource through the cache
    pub async fn fetch_one(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<Value>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                resource: request.to_string(),
            });
        }
        self.resolve(request).await
    }

    async fn resolve(&self, request: &FetchRequest) -> Result<Arc<Value>, FetchError> {
        if let Some(hit) = self.cache.get(&request.id).await {
            tracing::trace!("Cache hit for {}", request.id);
            return Ok(hit);
        }

        let payload = Arc::new(self.client.get(request).await?);
        self.cache.set(request.id.clone(), Arc::clone(&payload)).await;
        Ok(payload)
    }
}
