//! Notification fanout for newly admitted releases.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{DeliveryError, Result};
use crate::models::{ActionButton, OutgoingMessage, ReleaseRecord, SectionKey};
use crate::services::MessageSender;
use crate::storage::SubscriberRegistry;

/// Sample buttons supported by the action layout.
const MAX_SAMPLE_ACTIONS: usize = 4;

/// Per-recipient outcome of one dispatch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeliveryReport {
    pub section_key: SectionKey,
    pub external_id: u64,

    /// Chats that received the message
    pub delivered: Vec<i64>,

    /// Chats that revoked the bot and were marked inactive
    pub deactivated: Vec<i64>,

    /// Chats whose delivery failed for another reason
    pub failed: Vec<(i64, String)>,
}

impl DeliveryReport {
    fn new(record: &ReleaseRecord) -> Self {
        Self {
            section_key: record.section_key,
            external_id: record.external_id,
            delivered: Vec::new(),
            deactivated: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn recipients(&self) -> usize {
        self.delivered.len() + self.deactivated.len() + self.failed.len()
    }

    /// Every recipient received the message.
    pub fn is_complete(&self) -> bool {
        self.deactivated.is_empty() && self.failed.is_empty()
    }
}

/// Resolves subscribers for a release and delivers it to each of them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: Arc<dyn SubscriberRegistry>,
    sender: Arc<dyn MessageSender>,
    concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<dyn SubscriberRegistry>,
        sender: Arc<dyn MessageSender>,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            sender,
            concurrency: concurrency.max(1),
        }
    }

    /// Deliver a release to every active subscriber of its group.
    ///
    /// Per-recipient failures end up in the report. Only registry failures
    /// are returned as errors.
    pub async fn dispatch(&self, record: &ReleaseRecord) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::new(record);
        let recipients = self
            .registry
            .find_subscribers(record.section_key.genre)
            .await?;

        if recipients.is_empty() {
            log::debug!(
                "No subscribers for release {} in {}",
                record.external_id,
                record.section_key
            );
            return Ok(report);
        }

        let message = render_message(record);
        let sender = &self.sender;
        let message = &message;

        let outcomes: Vec<(i64, std::result::Result<(), DeliveryError>)> =
            stream::iter(recipients)
                .map(|chat_id| async move { (chat_id, sender.send(chat_id, message).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        for (chat_id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered.push(chat_id),
                Err(e) if e.is_revoked() => {
                    log::info!("Chat {chat_id} revoked access: {e}");
                    self.registry.deactivate(chat_id).await?;
                    report.deactivated.push(chat_id);
                }
                Err(e) => {
                    log::warn!(
                        "Delivery of {} to chat {} failed: {}",
                        record.external_id,
                        chat_id,
                        e
                    );
                    report.failed.push((chat_id, e.to_string()));
                }
            }
        }

        report.delivered.sort_unstable();
        report.deactivated.sort_unstable();
        report.failed.sort_unstable();

        log::info!(
            "Release {} in {}: delivered {}/{}",
            record.external_id,
            record.section_key,
            report.delivered.len(),
            report.recipients()
        );
        Ok(report)
    }
}

/// Render the notification text and sample buttons for a release.
pub fn render_message(record: &ReleaseRecord) -> OutgoingMessage {
    let key = record.section_key;
    let price = record.price_text.replace('!', "!\n");

    let text = format!(
        "{}\n{}\n\n{}\n{}\n\n{}\n{}\nLINK: {}",
        entity(key.genre.label(), '*'),
        key.listing.label(),
        entity(&record.title, '*'),
        entity(&record.catalog_number, '_'),
        escape_markdown(&record.tracklist),
        escape_markdown(price.trim_end()),
        escape_markdown(&record.detail_url),
    );

    OutgoingMessage {
        text,
        actions: sample_actions(&record.sample_urls),
    }
}

/// Lay out sample buttons: up to three in one row, four as two rows of two.
///
/// Only the first four samples get a button.
pub fn sample_actions(sample_urls: &[String]) -> Vec<Vec<ActionButton>> {
    if sample_urls.len() > MAX_SAMPLE_ACTIONS {
        log::debug!(
            "{} samples listed, attaching the first {}",
            sample_urls.len(),
            MAX_SAMPLE_ACTIONS
        );
    }

    let buttons: Vec<ActionButton> = sample_urls
        .iter()
        .take(MAX_SAMPLE_ACTIONS)
        .zip('A'..)
        .map(|(url, letter)| ActionButton {
            text: format!("PLAY {letter}"),
            url: url.clone(),
        })
        .collect();

    match buttons.len() {
        0 => Vec::new(),
        4 => buttons.chunks(2).map(<[ActionButton]>::to_vec).collect(),
        _ => vec![buttons],
    }
}

fn is_markdown_special(c: char) -> bool {
    matches!(c, '_' | '*' | '[' | '`')
}

/// Escape characters that legacy Markdown would interpret.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if is_markdown_special(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Wrap `text` in a legacy Markdown entity delimited by `marker`.
///
/// Escapes are not allowed inside an entity, so the entity is closed
/// before each special character and reopened after it.
fn entity(text: &str, marker: char) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let mut open = false;
    for c in text.chars() {
        if is_markdown_special(c) {
            if open {
                out.push(marker);
                open = false;
            }
            out.push('\\');
        } else if !open {
            out.push(marker);
            open = true;
        }
        out.push(c);
    }
    if open {
        out.push(marker);
    }
    out
}
