//! Banner serving with stale-while-revalidate.
//!
//! - fresh copy: served as is
//! - stale copy: served immediately, refreshed in a background task
//! - nothing cached: rendered inline and cached
//!
//! A cache read failure counts as a miss. The request only fails when a
//! render is needed, it fails, and there is nothing cached to fall back on.

use signwall_core::{Artifact, ArtifactRenderer, SignwallResult};
use signwall_storage::{ArtifactCache, CacheLookup, CacheSource, SingleFlight};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;

/// Where a served banner came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    Fresh,
    Stale,
    Rendered,
}

impl ServeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Rendered => "rendered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedArtifact {
    pub artifact: Artifact,
    pub source: ServeSource,
}

#[derive(Clone)]
pub struct ArtifactService {
    cache: Arc<ArtifactCache>,
    renderer: Arc<dyn ArtifactRenderer>,
    /// `None` disables collapsing of concurrent renders.
    flights: Option<Arc<SingleFlight>>,
}

impl ArtifactService {
    pub fn new(
        cache: Arc<ArtifactCache>,
        renderer: Arc<dyn ArtifactRenderer>,
        single_flight: bool,
    ) -> Self {
        Self {
            cache,
            renderer,
            flights: single_flight.then(|| Arc::new(SingleFlight::new())),
        }
    }

    fn flight_key(&self) -> &str {
        self.cache.config().fresh_key()
    }

    /// Serve the banner.
    pub async fn serve(&self) -> ApiResult<ServedArtifact> {
        match self.lookup().await {
            CacheLookup {
                artifact: Some(artifact),
                source: CacheSource::Fresh,
            } => Ok(ServedArtifact {
                artifact,
                source: ServeSource::Fresh,
            }),
            CacheLookup {
                artifact: Some(artifact),
                ..
            } => {
                self.spawn_refresh();
                Ok(ServedArtifact {
                    artifact,
                    source: ServeSource::Stale,
                })
            }
            CacheLookup { artifact: None, .. } => {
                let (artifact, source) = self.render_inline().await?;
                Ok(ServedArtifact { artifact, source })
            }
        }
    }

    async fn lookup(&self) -> CacheLookup {
        let lookup = match self.cache.get().await {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(error = %e, "Banner cache read failed, treating as miss");
                if let Some(metrics) = metrics() {
                    metrics.record_cache_lookup("error");
                }
                return CacheLookup::empty();
            }
        };
        if let Some(metrics) = metrics() {
            metrics.record_cache_lookup(lookup.source.as_str());
        }
        lookup
    }

    /// Refresh in the background, unless a refresh is already running.
    pub fn spawn_refresh(&self) -> Option<JoinHandle<()>> {
        let guard = match &self.flights {
            Some(flights) => match flights.try_acquire(self.flight_key()) {
                Some(guard) => Some(guard),
                None => {
                    tracing::debug!("Banner refresh already in flight");
                    return None;
                }
            },
            None => None,
        };

        let service = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = service.render_and_store().await {
                tracing::warn!(error = %e, "Background banner refresh failed");
            }
        }))
    }

    async fn render_inline(&self) -> ApiResult<(Artifact, ServeSource)> {
        let _guard = match &self.flights {
            Some(flights) => Some(flights.acquire(self.flight_key()).await),
            None => None,
        };

        if self.flights.is_some() {
            // The previous holder may have filled the cache while we waited.
            if let Ok(CacheLookup {
                artifact: Some(artifact),
                source: CacheSource::Fresh,
            }) = self.cache.get().await
            {
                return Ok((artifact, ServeSource::Fresh));
            }
        }

        self.render_and_store()
            .await
            .map(|artifact| (artifact, ServeSource::Rendered))
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to generate banner");
                ApiError::internal_error("Failed to generate banner")
            })
    }

    async fn render_and_store(&self) -> SignwallResult<Artifact> {
        let start = Instant::now();
        let result = self.renderer.render().await;
        if let Some(metrics) = metrics() {
            metrics.record_render(result.is_ok(), start.elapsed().as_secs_f64());
        }
        let artifact = result?;

        if let Err(e) = self.cache.set(&artifact).await {
            tracing::warn!(error = %e, "Failed to cache rendered banner");
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Utc;
    use signwall_core::ARTIFACT_FRESH_TTL;
    use signwall_storage::{InMemoryKvStore, KeyValueStore};
    use signwall_test_utils::{FakeRenderer, FlakyKvStore, ManualClock};
    use std::time::Duration;

    fn service_over(
        store: Arc<dyn KeyValueStore>,
        renderer: Arc<FakeRenderer>,
        single_flight: bool,
    ) -> (ArtifactService, Arc<ArtifactCache>) {
        let cache = Arc::new(ArtifactCache::with_defaults(store));
        (
            ArtifactService::new(cache.clone(), renderer, single_flight),
            cache,
        )
    }

    async fn wait_for_calls(renderer: &FakeRenderer, calls: usize) {
        for _ in 0..200 {
            if renderer.calls() >= calls {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_miss_renders_then_serves_fresh() {
        let renderer = Arc::new(FakeRenderer::new());
        let (service, _) = service_over(Arc::new(InMemoryKvStore::new()), renderer.clone(), true);

        let first = service.serve().await.expect("serve");
        assert_eq!(first.source, ServeSource::Rendered);
        let second = service.serve().await.expect("serve");
        assert_eq!(second.source, ServeSource::Fresh);
        assert_eq!(second.artifact, first.artifact);
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_is_served_and_refreshed_in_background() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryKvStore::with_clock(clock.clone()));
        let renderer = Arc::new(FakeRenderer::new());
        let (service, cache) = service_over(store, renderer.clone(), true);

        let old = Artifact::png(vec![0xAA; 4], Utc::now());
        cache.set(&old).await.expect("seed");
        clock.advance(ARTIFACT_FRESH_TTL + Duration::from_secs(1));

        let served = service.serve().await.expect("serve");
        assert_eq!(served.source, ServeSource::Stale);
        assert_eq!(served.artifact, old);

        wait_for_calls(&renderer, 1).await;
        assert_eq!(renderer.calls(), 1);
        for _ in 0..200 {
            if cache.get().await.expect("get").source == CacheSource::Fresh {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let refreshed = cache.get().await.expect("get");
        assert_eq!(refreshed.source, CacheSource::Fresh);
        assert_ne!(refreshed.artifact, Some(old));
    }

    #[tokio::test]
    async fn test_background_refresh_skipped_while_in_flight() {
        let renderer = Arc::new(FakeRenderer::with_latency(Duration::from_millis(100)));
        let (service, _) = service_over(Arc::new(InMemoryKvStore::new()), renderer.clone(), true);

        let first = service.spawn_refresh();
        assert!(first.is_some());
        assert!(service.spawn_refresh().is_none());
        first.unwrap().await.unwrap();
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_render_once_with_single_flight() {
        let renderer = Arc::new(FakeRenderer::with_latency(Duration::from_millis(50)));
        let (service, _) = service_over(Arc::new(InMemoryKvStore::new()), renderer.clone(), true);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.serve().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_each_render_without_single_flight() {
        let renderer = Arc::new(FakeRenderer::with_latency(Duration::from_millis(250)));
        let (service, _) = service_over(Arc::new(InMemoryKvStore::new()), renderer.clone(), false);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.serve().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(renderer.calls(), 4);
    }

    #[tokio::test]
    async fn test_render_failure_with_nothing_cached_is_an_error() {
        let renderer = Arc::new(FakeRenderer::new());
        renderer.set_failing(true);
        let (service, _) = service_over(Arc::new(InMemoryKvStore::new()), renderer, true);

        let err = service.serve().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[tokio::test]
    async fn test_render_failure_still_serves_stale() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryKvStore::with_clock(clock.clone()));
        let renderer = Arc::new(FakeRenderer::new());
        renderer.set_failing(true);
        let (service, cache) = service_over(store, renderer, true);

        let old = Artifact::png(vec![1; 4], Utc::now());
        cache.set(&old).await.expect("seed");
        clock.advance(ARTIFACT_FRESH_TTL * 2);

        let served = service.serve().await.expect("stale still served");
        assert_eq!(served.artifact, old);
    }

    #[tokio::test]
    async fn test_cache_read_failure_degrades_to_render() {
        let store = Arc::new(FlakyKvStore::new());
        store.fail_reads(true);
        let renderer = Arc::new(FakeRenderer::new());
        let (service, _) = service_over(store.clone(), renderer.clone(), false);

        let served = service.serve().await.expect("rendered despite cache outage");
        assert_eq!(served.source, ServeSource::Rendered);
        assert_eq!(renderer.calls(), 1);
        // The render was still written through.
        assert_eq!(store.inner().len(), 2);
    }
}
