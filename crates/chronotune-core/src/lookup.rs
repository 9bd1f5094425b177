use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LookupConfig;
use crate::year::{Year, YearBounds};

mod matching;
mod query;
mod spotify;

pub use matching::select_year;
pub use query::{SearchQuery, strategies};
pub use spotify::SpotifyCatalog;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("catalog unreachable: {0}")]
    NetworkUnavailable(String),
    #[error("catalog quota exhausted")]
    QuotaExceeded,
    #[error("catalog asked to slow down")]
    RateLimited(Option<Duration>),
    #[error("catalog rejected credentials: {0}")]
    Unauthorized(String),
    #[error("catalog request timed out")]
    Timeout,
    #[error("catalog error {0}: {1}")]
    Api(u16, String),
    #[error("unexpected catalog response: {0}")]
    Parse(String),
}

impl LookupError {
    /// Errors after which no further request this run can succeed.
    pub fn disables_lookup(&self) -> bool {
        matches!(
            self,
            LookupError::NetworkUnavailable(_)
                | LookupError::QuotaExceeded
                | LookupError::Unauthorized(_)
        )
    }
}

/// One track hit returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Release date of the album the hit belongs to (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
    pub release_date: Option<String>,
}

impl CatalogTrack {
    pub fn release_year(&self) -> Option<Year> {
        self.release_date.as_deref().and_then(Year::from_date_prefix)
    }
}

/// Remote music catalog able to answer free-text track searches.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>, LookupError>;
}

/// Artist/title pair used to query the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupHints {
    pub title: Option<String>,
    pub artist: Option<String>,
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Year lookup against a remote catalog with pacing and run-wide degradation.
///
/// All clones share one token bucket and one disabled flag, so concurrent workers
/// together stay within the configured quota and stop together once the catalog
/// becomes unusable.
#[derive(Clone)]
pub struct ExternalResolver {
    service: Option<Arc<dyn CatalogService>>,
    config: LookupConfig,
    limiter: Arc<DirectLimiter>,
    disabled: Arc<AtomicBool>,
    bounds: YearBounds,
}

impl ExternalResolver {
    pub fn new(service: Arc<dyn CatalogService>, config: LookupConfig, bounds: YearBounds) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let enabled = config.enabled;
        Self {
            service: Some(service),
            config,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            disabled: Arc::new(AtomicBool::new(!enabled)),
            bounds,
        }
    }

    /// Resolver that always answers `None`, used without credentials or when switched off.
    pub fn disabled() -> Self {
        Self {
            service: None,
            config: LookupConfig::disabled(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::MIN))),
            disabled: Arc::new(AtomicBool::new(true)),
            bounds: YearBounds::current(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.service.is_some() && !self.disabled.load(Ordering::Acquire)
    }

    fn disable(&self, err: &LookupError) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            warn!(error = %err, "external lookup disabled for the rest of this run");
        }
    }

    /// Tries each query strategy until one yields a year.
    pub async fn resolve(&self, hints: &LookupHints) -> Option<Year> {
        let service = self.service.as_ref()?;
        let title = hints.title.as_deref()?;

        for query in strategies(title, hints.artist.as_deref()) {
            if !self.is_active() {
                return None;
            }
            let Some(text) = query.text() else {
                continue;
            };
            debug!(strategy = query.label, query = %text, "searching catalog");

            match self.search_with_retry(service.as_ref(), &text).await {
                Ok(hits) => {
                    let year = select_year(
                        &hits,
                        &query.title,
                        query.artist.as_deref(),
                        self.config.min_score,
                        &self.bounds,
                    );
                    if year.is_some() {
                        debug!(strategy = query.label, ?year, "catalog match");
                        return year;
                    }
                }
                Err(LookupError::Timeout) => {
                    debug!(query = %text, "catalog timed out, treating file as unknown");
                    return None;
                }
                Err(err) if err.disables_lookup() => {
                    self.disable(&err);
                    return None;
                }
                Err(err) => {
                    debug!(query = %text, error = %err, "catalog search failed");
                }
            }
        }
        None
    }

    async fn search_with_retry(
        &self,
        service: &dyn CatalogService,
        text: &str,
    ) -> Result<Vec<CatalogTrack>, LookupError> {
        let mut delay = self.config.backoff;
        let mut attempt = 0;
        loop {
            self.limiter.until_ready().await;
            let outcome = tokio::time::timeout(
                self.config.timeout,
                service.search_tracks(text, self.config.search_limit),
            )
            .await
            .unwrap_or(Err(LookupError::Timeout));

            match outcome {
                Err(LookupError::RateLimited(retry_after)) => {
                    if attempt >= self.config.max_retries {
                        return Err(LookupError::QuotaExceeded);
                    }
                    let wait = retry_after.unwrap_or(delay);
                    if wait > self.config.max_backoff {
                        debug!(?wait, "catalog wait exceeds the backoff limit");
                        return Err(LookupError::QuotaExceeded);
                    }
                    attempt += 1;
                    debug!(attempt, ?wait, "catalog rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{mock, predicate::always};

    mock! {
        pub Catalog {}

        #[async_trait]
        impl CatalogService for Catalog {
            async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>, LookupError>;
        }
    }

    fn config() -> LookupConfig {
        LookupConfig {
            requests_per_second: 1_000,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
            ..LookupConfig::default()
        }
    }

    fn bounds() -> YearBounds {
        YearBounds {
            earliest: 1900,
            latest: 2030,
        }
    }

    fn hints(artist: &str, title: &str) -> LookupHints {
        LookupHints {
            title: Some(title.into()),
            artist: Some(artist.into()),
        }
    }

    fn hit(title: &str, artist: &str, date: &str) -> CatalogTrack {
        CatalogTrack {
            title: title.into(),
            artists: vec![artist.into()],
            album: None,
            release_date: Some(date.into()),
        }
    }

    #[tokio::test]
    async fn returns_year_from_first_successful_strategy() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search_tracks()
            .with(always(), always())
            .times(1)
            .returning(|_, _| Ok(vec![hit("Creep", "Radiohead", "1992-09-21")]));

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        let year = resolver.resolve(&hints("Radiohead", "Creep")).await;
        assert_eq!(year.map(Year::get), Some(1992));
    }

    #[tokio::test]
    async fn falls_through_strategies_on_empty_results() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search_tracks()
            .withf(|query, _| query.to_string() == "Radiohead Creep")
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        catalog
            .expect_search_tracks()
            .withf(|query, _| query.to_string() == "Creep")
            .times(1)
            .returning(|_, _| Ok(vec![hit("Creep", "Radiohead", "1993")]));

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        let year = resolver.resolve(&hints("Radiohead", "Creep")).await;
        assert_eq!(year.map(Year::get), Some(1993));
    }

    #[tokio::test]
    async fn quota_exhaustion_disables_for_the_run() {
        let mut catalog = MockCatalog::new();
        // one attempt plus two retries, then never again
        catalog
            .expect_search_tracks()
            .times(3)
            .returning(|_, _| Err(LookupError::RateLimited(None)));

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        assert_eq!(resolver.resolve(&hints("Radiohead", "Creep")).await, None);
        assert!(!resolver.is_active());
        assert_eq!(resolver.resolve(&hints("Muse", "Uprising")).await, None);
    }

    #[tokio::test]
    async fn retry_after_rate_limit_recovers() {
        let mut catalog = MockCatalog::new();
        let mut calls = 0;
        catalog.expect_search_tracks().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(LookupError::RateLimited(Some(Duration::from_millis(1))))
            } else {
                Ok(vec![hit("Creep", "Radiohead", "1992")])
            }
        });

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        let year = resolver.resolve(&hints("Radiohead", "Creep")).await;
        assert_eq!(year.map(Year::get), Some(1992));
        assert!(resolver.is_active());
    }

    #[tokio::test]
    async fn long_retry_hint_disables_instead_of_waiting() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search_tracks()
            .times(1)
            .returning(|_, _| Err(LookupError::RateLimited(Some(Duration::from_secs(86_400)))));

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        let year = tokio::time::timeout(
            Duration::from_secs(3),
            resolver.resolve(&hints("Radiohead", "Creep")),
        )
        .await
        .expect("resolve must not sleep through the retry hint");
        assert_eq!(year, None);
        assert!(!resolver.is_active());
    }

    #[tokio::test]
    async fn network_failure_disables_shared_clones() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search_tracks()
            .times(1)
            .returning(|_, _| Err(LookupError::NetworkUnavailable("dns".into())));

        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        let worker = resolver.clone();
        assert_eq!(worker.resolve(&hints("Radiohead", "Creep")).await, None);
        assert!(!resolver.is_active());
    }

    #[tokio::test]
    async fn slow_catalog_counts_as_unknown() {
        struct Slow;

        #[async_trait]
        impl CatalogService for Slow {
            async fn search_tracks(&self, _: &str, _: u32) -> Result<Vec<CatalogTrack>, LookupError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Vec::new())
            }
        }

        let resolver = ExternalResolver::new(Arc::new(Slow), config(), bounds());
        assert_eq!(resolver.resolve(&hints("Radiohead", "Creep")).await, None);
        // a timeout is per file, not run-wide
        assert!(resolver.is_active());
    }

    #[tokio::test]
    async fn disabled_resolver_never_calls_out() {
        let resolver = ExternalResolver::disabled();
        assert!(!resolver.is_active());
        assert_eq!(resolver.resolve(&hints("Radiohead", "Creep")).await, None);

        let mut catalog = MockCatalog::new();
        catalog.expect_search_tracks().never();
        let switched_off = ExternalResolver::new(Arc::new(catalog), LookupConfig::disabled(), bounds());
        assert_eq!(switched_off.resolve(&hints("Radiohead", "Creep")).await, None);
    }

    #[tokio::test]
    async fn missing_title_skips_lookup() {
        let mut catalog = MockCatalog::new();
        catalog.expect_search_tracks().never();
        let resolver = ExternalResolver::new(Arc::new(catalog), config(), bounds());
        assert_eq!(resolver.resolve(&LookupHints::default()).await, None);
    }
}
