//! Release data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SectionKey;

/// A catalog item as scraped from a section listing in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseRecord {
    /// Identifier assigned by the catalog site
    pub external_id: u64,

    /// Section the item was listed in
    pub section_key: SectionKey,

    /// Artist and title
    pub title: String,

    /// Catalog number and label
    pub catalog_number: String,

    pub tracklist: String,

    pub price_text: String,

    /// Full URL to the item page
    pub detail_url: String,

    pub image_url: String,

    /// Audio sample URLs in listing order
    #[serde(default)]
    pub sample_urls: Vec<String>,

    /// Raw stock status text from the listing
    #[serde(default)]
    pub availability_status: String,
}

impl ReleaseRecord {
    /// Whether the listing marks this item as unavailable.
    pub fn is_out_of_stock(&self) -> bool {
        let status = self.availability_status.to_lowercase();
        status.contains("out of stock") || status.contains("sold out")
    }
}

/// Dedup bookkeeping for one previously seen item in a section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnownIdEntry {
    pub section_key: SectionKey,
    pub external_id: u64,

    /// Monotonic insertion order within the section
    pub sequence_id: u64,

    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, Listing};

    fn sample_release(status: &str) -> ReleaseRecord {
        ReleaseRecord {
            external_id: 101,
            section_key: SectionKey::new(Genre::TechnoElectro, Listing::Discount30),
            title: "Artist - Title".to_string(),
            catalog_number: "CAT001 – Label".to_string(),
            tracklist: "A1 Track".to_string(),
            price_text: "£9.99".to_string(),
            detail_url: "https://example.com/101".to_string(),
            image_url: "https://example.com/101.jpg".to_string(),
            sample_urls: vec![],
            availability_status: status.to_string(),
        }
    }

    #[test]
    fn test_out_of_stock_detection() {
        assert!(sample_release("Out Of Stock").is_out_of_stock());
        assert!(sample_release("SOLD OUT").is_out_of_stock());
        assert!(!sample_release("In Stock").is_out_of_stock());
        assert!(!sample_release("").is_out_of_stock());
    }
}
