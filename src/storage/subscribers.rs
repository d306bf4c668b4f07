//! Local filesystem subscriber registry.
//!
//! All subscribers live in a single `subscribers.json`. Reads and writes go
//! through one async mutex, so deactivations raised by concurrent deliveries
//! are applied one at a time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{AppError, Result};
use crate::models::{Genre, GenreStats, StorageConfig, Subscriber, SubscriberStats};
use crate::storage::SubscriberRegistry;
use crate::storage::local::{read_json_file, write_atomic};

const SUBSCRIBERS_KEY: &str = "subscribers.json";

type Subscribers = BTreeMap<i64, Subscriber>;

pub struct LocalSubscriberRegistry {
    path: PathBuf,
    state: Mutex<Option<Subscribers>>,
}

impl LocalSubscriberRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root_dir.join(SUBSCRIBERS_KEY))
    }

    /// Lock the registry, loading it from disk on first use.
    async fn loaded(&self) -> Result<MutexGuard<'_, Option<Subscribers>>> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.load().await?);
        }
        Ok(state)
    }

    /// Run `f` against a copy of the subscriber map. When `f` reports a
    /// change the copy is persisted, then replaces the cached map.
    async fn update<T>(&self, f: impl FnOnce(&mut Subscribers) -> (T, bool)) -> Result<T> {
        let mut state = self.loaded().await?;
        let mut subscribers = (*state).clone().unwrap_or_default();

        let (value, changed) = f(&mut subscribers);
        if changed {
            let bytes = serde_json::to_vec_pretty(&subscribers.values().collect::<Vec<_>>())
                .map_err(|e| AppError::storage(SUBSCRIBERS_KEY, e))?;
            write_atomic(&self.path, &bytes)
                .await
                .map_err(|e| AppError::storage(SUBSCRIBERS_KEY, e))?;
            *state = Some(subscribers);
        }
        Ok(value)
    }

    async fn read<T>(&self, f: impl FnOnce(&Subscribers) -> T) -> Result<T> {
        let state = self.loaded().await?;
        match state.as_ref() {
            Some(subscribers) => Ok(f(subscribers)),
            None => Err(AppError::storage(SUBSCRIBERS_KEY, "registry not loaded")),
        }
    }

    async fn load(&self) -> Result<Subscribers> {
        let list: Vec<Subscriber> = read_json_file(&self.path, SUBSCRIBERS_KEY)
            .await?
            .unwrap_or_default();
        log::debug!("Loaded {} subscribers", list.len());
        Ok(list.into_iter().map(|s| (s.chat_id, s)).collect())
    }

    /// Register a chat. Returns true when the chat was not known before.
    ///
    /// A known chat is re-activated with its subscriptions cleared.
    pub async fn register(&self, chat_id: i64) -> Result<bool> {
        self.update(|subscribers| {
            let is_new = !subscribers.contains_key(&chat_id);
            let entry = subscribers
                .entry(chat_id)
                .or_insert_with(|| Subscriber::new(chat_id));
            entry.is_active = true;
            for flag in entry.subscriptions.values_mut() {
                *flag = false;
            }
            (is_new, true)
        })
        .await
    }

    /// Subscribe a chat to a genre, registering it if needed.
    pub async fn subscribe(&self, chat_id: i64, genre: Genre) -> Result<()> {
        self.update(|subscribers| {
            let entry = subscribers
                .entry(chat_id)
                .or_insert_with(|| Subscriber::new(chat_id));
            let changed = !entry.is_subscribed(genre);
            entry.subscriptions.insert(genre, true);
            ((), changed)
        })
        .await?;
        log::info!("Chat {chat_id} subscribed to {genre}");
        Ok(())
    }

    /// Clear every subscription of a chat. Unknown chats are ignored.
    pub async fn unsubscribe_all(&self, chat_id: i64) -> Result<()> {
        self.update(|subscribers| match subscribers.get_mut(&chat_id) {
            Some(entry) => {
                let changed = entry.subscriptions.values().any(|flag| *flag);
                for flag in entry.subscriptions.values_mut() {
                    *flag = false;
                }
                ((), changed)
            }
            None => ((), false),
        })
        .await
    }

    /// Genres the chat is subscribed to, or None for an unknown chat.
    pub async fn subscriptions(&self, chat_id: i64) -> Result<Option<Vec<Genre>>> {
        self.read(|subscribers| {
            subscribers.get(&chat_id).map(|entry| {
                Genre::ALL
                    .into_iter()
                    .filter(|g| entry.is_subscribed(*g))
                    .collect()
            })
        })
        .await
    }

    pub async fn get(&self, chat_id: i64) -> Result<Option<Subscriber>> {
        self.read(|subscribers| subscribers.get(&chat_id).cloned())
            .await
    }

    pub async fn stats(&self) -> Result<SubscriberStats> {
        self.read(|subscribers| {
            let mut stats = SubscriberStats {
                users_total: subscribers.len(),
                users_active: subscribers.values().filter(|s| s.is_active).count(),
                genres: Genre::ALL
                    .iter()
                    .map(|g| (*g, GenreStats::default()))
                    .collect(),
            };
            for subscriber in subscribers.values() {
                for (genre, counts) in stats.genres.iter_mut() {
                    if subscriber.is_subscribed(*genre) {
                        counts.total += 1;
                        if subscriber.is_active {
                            counts.active += 1;
                        }
                    }
                }
            }
            stats
        })
        .await
    }
}

#[async_trait]
impl SubscriberRegistry for LocalSubscriberRegistry {
    async fn find_subscribers(&self, group: Genre) -> Result<Vec<i64>> {
        self.read(|subscribers| {
            subscribers
                .values()
                .filter(|s| s.wants(group))
                .map(|s| s.chat_id)
                .collect()
        })
        .await
    }

    async fn deactivate(&self, chat_id: i64) -> Result<()> {
        let changed = self
            .update(|subscribers| match subscribers.get_mut(&chat_id) {
                Some(entry) if entry.is_active => {
                    entry.is_active = false;
                    (true, true)
                }
                _ => (false, false),
            })
            .await?;
        if changed {
            log::info!("Deactivated chat {chat_id}");
        }
        Ok(())
    }
}
