//! Test doubles shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, DeliveryError, Result};
use crate::models::{OutgoingMessage, ReleaseRecord, SectionDescriptor, SectionKey};
use crate::services::{ListingSource, MessageSender};

pub fn release(key: SectionKey, id: u64) -> ReleaseRecord {
    ReleaseRecord {
        external_id: id,
        section_key: key,
        title: format!("Artist - Title {id}"),
        catalog_number: format!("CAT{id} – Label"),
        tracklist: "A1 Track".to_string(),
        price_text: "£9.99".to_string(),
        detail_url: format!("https://example.com/{id}"),
        image_url: String::new(),
        sample_urls: vec![],
        availability_status: "In Stock".to_string(),
    }
}

/// Records deliveries and fails chats with a canned error.
#[derive(Default)]
pub struct RecordingSender {
    failures: HashMap<i64, DeliveryError>,
    pub sent: Mutex<Vec<(i64, OutgoingMessage)>>,
}

impl RecordingSender {
    pub fn failing(failures: impl IntoIterator<Item = (i64, DeliveryError)>) -> Self {
        Self {
            failures: failures.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Chat ids that received a message, sorted.
    pub fn sent_to(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError> {
        if let Some(error) = self.failures.get(&chat_id) {
            return Err(error.clone());
        }
        self.sent.lock().unwrap().push((chat_id, message.clone()));
        Ok(())
    }
}

/// Serves canned listings per section, in page order.
#[derive(Default)]
pub struct StubSource {
    listings: Mutex<HashMap<SectionKey, Vec<u64>>>,
    broken: Mutex<HashSet<SectionKey>>,
}

impl StubSource {
    pub fn set(&self, key: SectionKey, ids: &[u64]) {
        self.listings.lock().unwrap().insert(key, ids.to_vec());
    }

    pub fn break_section(&self, key: SectionKey) {
        self.broken.lock().unwrap().insert(key);
    }

    pub fn restore(&self, key: SectionKey) {
        self.broken.lock().unwrap().remove(&key);
    }
}

#[async_trait]
impl ListingSource for StubSource {
    async fn fetch(&self, section: &SectionDescriptor) -> Result<Vec<ReleaseRecord>> {
        let key = section.section_key;
        if self.broken.lock().unwrap().contains(&key) {
            return Err(AppError::fetch(&section.source_url, "giving up after 6 attempts"));
        }
        let ids = self
            .listings
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default();
        Ok(ids.into_iter().map(|id| release(key, id)).collect())
    }
}
