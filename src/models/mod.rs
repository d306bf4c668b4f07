// src/models/mod.rs

//! Domain models for the notifier.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod message;
mod release;
mod section;
mod selectors;
mod subscriber;

// Re-export all public types
pub use config::{
    BOT_TOKEN_ENV, CatalogConfig, Config, CrawlerConfig, SchedulerConfig, StorageConfig,
    TelegramConfig,
};
pub use message::{ActionButton, OutgoingMessage};
pub use release::{KnownIdEntry, ReleaseRecord};
pub use section::{Genre, Listing, SectionCatalog, SectionDescriptor, SectionKey};
pub use selectors::ListingSelectors;
pub use subscriber::{GenreStats, Subscriber, SubscriberStats};
