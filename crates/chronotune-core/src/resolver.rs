use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::audio::{AudioFile, FileFingerprint};
use crate::cache::CacheStore;
use crate::filename::{extract_year, parse_hints};
use crate::kv::KvBackend;
use crate::lookup::{ExternalResolver, LookupHints};
use crate::metadata::{EmbeddedTags, MetadataReader};
use crate::resolution::{Resolution, YearSource};
use crate::year::{Year, YearBounds};

/// Number of files each source settled during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache: usize,
    pub metadata: usize,
    pub external: usize,
    pub filename: usize,
    pub unresolved: usize,
}

impl ResolverStats {
    fn record(&mut self, source: YearSource) {
        let slot = match source {
            YearSource::Cache => &mut self.cache,
            YearSource::Metadata => &mut self.metadata,
            YearSource::External => &mut self.external,
            YearSource::Filename => &mut self.filename,
            YearSource::Unresolved => &mut self.unresolved,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.cache + self.metadata + self.external + self.filename + self.unresolved
    }
}

/// Priority chain: cache, embedded tags, remote catalog, file name.
///
/// The first source that produces a plausible year ends the chain. Anything but a
/// cache hit is written back so the next run stops at the cache.
pub struct YearResolver<B: KvBackend> {
    cache: Arc<CacheStore<B>>,
    metadata: Arc<dyn MetadataReader>,
    external: ExternalResolver,
    bounds: YearBounds,
    stats: Mutex<ResolverStats>,
}

impl<B: KvBackend> YearResolver<B> {
    pub fn new(
        cache: Arc<CacheStore<B>>,
        metadata: Arc<dyn MetadataReader>,
        external: ExternalResolver,
        bounds: YearBounds,
    ) -> Self {
        Self {
            cache,
            metadata,
            external,
            bounds,
            stats: Mutex::new(ResolverStats::default()),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore<B>> {
        &self.cache
    }

    pub fn external(&self) -> &ExternalResolver {
        &self.external
    }

    pub fn stats(&self) -> ResolverStats {
        *self.stats.lock()
    }

    pub async fn resolve(&self, file: &AudioFile) -> Resolution {
        let fingerprint = file.fingerprint();
        let resolution = self.run_chain(file, &fingerprint).await;
        self.stats.lock().record(resolution.source());
        debug!(path = %file.path.display(), %resolution, "resolved");
        resolution
    }

    async fn run_chain(&self, file: &AudioFile, fingerprint: &FileFingerprint) -> Resolution {
        if let Some(entry) = self.cache.lookup(fingerprint).await {
            if let Some(year) = self.bounds.accept(entry.year) {
                return Resolution::resolved(year, YearSource::Cache);
            }
        }

        let tags = match self.metadata.read(file).await {
            Ok(tags) => tags,
            Err(err) => {
                debug!(path = %file.path.display(), error = %err, "no usable tags");
                EmbeddedTags::default()
            }
        };

        let Some((year, source)) = self.uncached(file, &tags).await else {
            return Resolution::Unresolved;
        };

        if let Err(err) = self.cache.store(fingerprint, year, source).await {
            warn!(path = %file.path.display(), error = %err, "failed to cache resolution");
        }
        Resolution::resolved(year, source)
    }

    async fn uncached(&self, file: &AudioFile, tags: &EmbeddedTags) -> Option<(Year, YearSource)> {
        if let Some(year) = tags.release_year(&self.bounds) {
            return Some((year, YearSource::Metadata));
        }
        if self.external.is_active() {
            if let Some(year) = self.external.resolve(&lookup_hints(file, tags)).await {
                return Some((year, YearSource::External));
            }
        }
        extract_year(file.file_stem(), &self.bounds).map(|year| (year, YearSource::Filename))
    }
}

/// Tag values first, then whatever the file stem suggests.
fn lookup_hints(file: &AudioFile, tags: &EmbeddedTags) -> LookupHints {
    if tags.title.is_some() {
        return LookupHints {
            title: tags.title.clone(),
            artist: tags.artist.clone(),
        };
    }
    let guessed = parse_hints(file.file_stem());
    LookupHints {
        title: guessed.title,
        artist: tags.artist.clone().or(guessed.artist),
    }
}
