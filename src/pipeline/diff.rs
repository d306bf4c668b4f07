//! Change detection against the known-id store.
//!
//! Computes which fetched releases are new for a section, persists them, and
//! decides which of them are worth announcing.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{ReleaseRecord, SectionKey};
use crate::storage::ReleaseStore;

/// Result of admitting one fetched listing.
#[derive(Debug, Clone, Default)]
pub struct Admission {
    /// New releases to announce, in input order
    pub admitted: Vec<ReleaseRecord>,

    /// New releases recorded but not announced
    pub suppressed: Vec<ReleaseRecord>,
}

impl Admission {
    pub fn has_changes(&self) -> bool {
        !self.admitted.is_empty() || !self.suppressed.is_empty()
    }

    /// Number of releases newly written to the store.
    pub fn recorded(&self) -> usize {
        self.admitted.len() + self.suppressed.len()
    }
}

/// Detector for newly listed releases.
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn ReleaseStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn ReleaseStore>) -> Self {
        Self { store }
    }

    /// Record every unknown release and return the ones to announce.
    ///
    /// Sold-out items newly listed in a sale section are recorded so they
    /// never come back as new, but are not announced.
    pub async fn admit(&self, key: SectionKey, records: &[ReleaseRecord]) -> Result<Admission> {
        let inserted = self.store.record_new(key, records).await?;

        let (suppressed, admitted): (Vec<_>, Vec<_>) = inserted
            .into_iter()
            .partition(|record| key.listing.is_sale() && record.is_out_of_stock());

        for record in &suppressed {
            log::debug!(
                "Suppressed sold-out release {} in {}",
                record.external_id,
                key
            );
        }
        if !admitted.is_empty() {
            log::info!("{}: {} new releases", key, admitted.len());
        }

        Ok(Admission {
            admitted,
            suppressed,
        })
    }

    /// Seed a section with its current listing without announcing anything.
    pub async fn initialize(&self, key: SectionKey, records: &[ReleaseRecord]) -> Result<usize> {
        self.store.seed(key, records).await
    }

    pub async fn is_initialized(&self, key: SectionKey) -> Result<bool> {
        self.store.is_seeded(key).await
    }
}
