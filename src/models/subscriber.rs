//! Subscriber records kept by the registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Genre;

/// A chat that can receive release notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: i64,

    /// False once the chat blocked the bot
    pub is_active: bool,

    /// Per-genre subscription flags
    #[serde(default)]
    pub subscriptions: BTreeMap<Genre, bool>,

    pub registered_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            is_active: true,
            subscriptions: Genre::ALL.iter().map(|g| (*g, false)).collect(),
            registered_at: Utc::now(),
        }
    }

    pub fn is_subscribed(&self, genre: Genre) -> bool {
        self.subscriptions.get(&genre).copied().unwrap_or(false)
    }

    /// Active and subscribed to the genre.
    pub fn wants(&self, genre: Genre) -> bool {
        self.is_active && self.is_subscribed(genre)
    }
}

/// Subscriber counts for one genre.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenreStats {
    pub active: usize,
    pub total: usize,
}

/// Registry-wide subscriber counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriberStats {
    pub users_total: usize,
    pub users_active: usize,
    pub genres: BTreeMap<Genre, GenreStats>,
}
