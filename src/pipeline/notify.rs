//! Entry point for externally triggered notifications.

use serde::Serialize;

use crate::error::Result;
use crate::models::SectionKey;
use crate::pipeline::{DeliveryReport, NotificationDispatcher};
use crate::storage::ReleaseStore;

/// Outcome of a notification request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// Every subscriber received the message (or there were none)
    Success(DeliveryReport),

    /// No persisted release matches the request
    NotFound,

    /// At least one subscriber did not receive the message
    PartialFailure(DeliveryReport),
}

/// Send the persisted release `(section_key, external_id)` to its subscribers.
///
/// The key is validated before anything is looked up. Calling this twice
/// notifies every subscriber twice.
pub async fn notify_new_item(
    store: &dyn ReleaseStore,
    dispatcher: &NotificationDispatcher,
    section_key: &str,
    external_id: u64,
) -> Result<NotifyOutcome> {
    let key: SectionKey = section_key.parse()?;

    let Some(record) = store.find(key, external_id).await? else {
        log::warn!("Release {external_id} not found in {key}");
        return Ok(NotifyOutcome::NotFound);
    };

    let report = dispatcher.dispatch(&record).await?;
    if report.is_complete() {
        Ok(NotifyOutcome::Success(report))
    } else {
        Ok(NotifyOutcome::PartialFailure(report))
    }
}
