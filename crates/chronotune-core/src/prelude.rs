pub use crate::audio::{AudioFile, AudioFormat, FileFingerprint};
pub use crate::cache::{CacheEntry, CacheStore};
pub use crate::config::{
    CatalogCredentials, Destination, LookupConfig, OrganizerConfig, YearFilter,
};
pub use crate::error::{ChronoError, Result};
pub use crate::events::{RunContext, RunEvent, RunStatus};
pub use crate::kv::{KvBackend, SledBackend};
pub use crate::lookup::{CatalogService, ExternalResolver, LookupError, SpotifyCatalog};
pub use crate::metadata::{LoftyMetadataReader, MetadataReader};
pub use crate::organize::{ExecutionReport, FailureReason, FileOutcome, Plan, SkipReason};
pub use crate::pipeline::{Organizer, RunReport};
pub use crate::resolution::{Resolution, YearSource};
pub use crate::resolver::{ResolverStats, YearResolver};
pub use crate::year::{Year, YearBounds};
