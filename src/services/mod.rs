//! Service layer for the notifier.
//!
//! This module contains the I/O-facing services:
//! - Release listing fetching (`ReleaseFetcher`)
//! - Message delivery (`TelegramSender`)

mod releases;
mod telegram;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::models::OutgoingMessage;

pub use releases::{ListingSource, ReleaseFetcher, fetch_paginated, sample_urls};
pub use telegram::TelegramSender;

/// Delivers a rendered message to one chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError>;
}
