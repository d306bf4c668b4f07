//! Storage abstractions for release history and subscribers.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml                    # Notifier configuration
//! ├── sections.json                  # Watched section catalog
//! ├── subscribers.json               # Subscriber registry
//! └── sections/                      # One history partition per section
//!     ├── techno_electro_new.json
//!     └── reggae_discount30.json
//! ```
//!
//! Each section partition is both the release history used to answer
//! notification requests and the known-id set used for deduplication.

pub mod local;
pub mod subscribers;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Genre, KnownIdEntry, ReleaseRecord, SectionCatalog, SectionKey};

// Re-export for convenience
pub use local::LocalStorage;
pub use subscribers::LocalSubscriberRegistry;

/// Per-section known-id store and release history.
///
/// Implementations must make every method atomic per section: two callers
/// never interleave reads and writes of the same section.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Whether the section has been seeded with an initial listing.
    async fn is_seeded(&self, key: SectionKey) -> Result<bool>;

    /// Replace the section's history with the given listing.
    ///
    /// Sequence ids keep increasing across re-seeding. Returns the number of
    /// entries held afterwards.
    async fn seed(&self, key: SectionKey, records: &[ReleaseRecord]) -> Result<usize>;

    /// Insert every record whose id is not yet known and return them in
    /// input order.
    ///
    /// Each inserted record gets the next sequence id. Afterwards the oldest
    /// entries are evicted until the section is back at its cap, except
    /// entries inserted by this call.
    async fn record_new(&self, key: SectionKey, records: &[ReleaseRecord])
    -> Result<Vec<ReleaseRecord>>;

    /// Look up a persisted release.
    async fn find(&self, key: SectionKey, external_id: u64) -> Result<Option<ReleaseRecord>>;

    /// Known-id entries in ascending sequence order.
    async fn entries(&self, key: SectionKey) -> Result<Vec<KnownIdEntry>>;

    /// Persist the section catalog.
    async fn save_catalog(&self, catalog: &SectionCatalog) -> Result<()>;

    /// Load the persisted section catalog, if any.
    async fn load_catalog(&self) -> Result<Option<SectionCatalog>>;
}

/// Lookup service for notification recipients.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Chat ids that are active and subscribed to the group.
    async fn find_subscribers(&self, group: Genre) -> Result<Vec<i64>>;

    /// Mark a chat inactive. Idempotent.
    async fn deactivate(&self, chat_id: i64) -> Result<()>;
}
