// src/services/releases.rs

//! Release listing fetcher.
//!
//! Fetches a section's listing page (and its second page when the first is
//! full) and parses each release container into a [`ReleaseRecord`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, ListingSelectors, ReleaseRecord, SectionDescriptor, SectionKey};
use crate::utils::http::fetch_page_text;
use crate::utils::retry::{RetryPolicy, retry_with_cooldown};
use crate::utils::{extract_release_id, normalize_whitespace, resolve_url};

/// Anything that can produce the current listing of a section.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the section's releases in source page order.
    async fn fetch(&self, section: &SectionDescriptor) -> Result<Vec<ReleaseRecord>>;
}

/// Compiled listing selectors.
struct CompiledSelectors {
    release: Selector,
    title: Selector,
    label: Selector,
    tracks: Selector,
    price: Selector,
    sample: Selector,
    image: Selector,
    link: Selector,
    status: Selector,
}

impl CompiledSelectors {
    fn compile(s: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            release: parse_selector(&s.release_selector)?,
            title: parse_selector(&s.title_selector)?,
            label: parse_selector(&s.label_selector)?,
            tracks: parse_selector(&s.tracks_selector)?,
            price: parse_selector(&s.price_selector)?,
            sample: parse_selector(&s.sample_selector)?,
            image: parse_selector(&s.image_selector)?,
            link: parse_selector(&s.link_selector)?,
            status: parse_selector(&s.status_selector)?,
        })
    }
}

/// Fetches and parses release listings from the catalog site.
pub struct ReleaseFetcher {
    config: Arc<Config>,
    client: Client,
    selectors: CompiledSelectors,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl ReleaseFetcher {
    /// Create a fetcher sharing the given client and shutdown signal.
    pub fn new(config: Arc<Config>, client: Client, shutdown: CancellationToken) -> Result<Self> {
        let selectors = CompiledSelectors::compile(&config.catalog.selectors)?;
        let retry = RetryPolicy::new(config.crawler.max_retries, config.crawler.retry_delay());
        Ok(Self {
            config,
            client,
            selectors,
            retry,
            shutdown,
        })
    }

    /// Fetch one listing page, retrying transient failures.
    async fn fetch_page(&self, key: SectionKey, url: String) -> Result<Vec<ReleaseRecord>> {
        log::info!("Trying to get {}", url);
        let html = retry_with_cooldown(&self.retry, &self.shutdown, &url, |_| {
            fetch_page_text(&self.client, &url)
        })
        .await?;

        let records = self.parse_listing(&html, &url, key)?;
        log::info!("{} releases found at {}", records.len(), url);
        Ok(records)
    }

    /// Parse a listing page into records, in page order.
    pub fn parse_listing(
        &self,
        html: &str,
        page_url: &str,
        key: SectionKey,
    ) -> Result<Vec<ReleaseRecord>> {
        let document = Html::parse_document(html);
        let base_url = Url::parse(page_url)?;

        let mut containers = 0;
        let mut records = Vec::new();
        for release in document.select(&self.selectors.release) {
            containers += 1;
            match self.parse_release(&release, &base_url, key) {
                Some(record) => records.push(record),
                None => log::warn!("Skipping unparseable release at {}", page_url),
            }
        }

        if containers > 0 && records.is_empty() {
            return Err(AppError::parse(
                page_url,
                format!("{containers} release containers found but none could be parsed"),
            ));
        }
        Ok(records)
    }

    fn parse_release(
        &self,
        release: &ElementRef,
        base_url: &Url,
        key: SectionKey,
    ) -> Option<ReleaseRecord> {
        let sel = &self.selectors;

        let detail_url = release
            .select(&sel.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(base_url, href))
            .unwrap_or_default();

        let external_id = release
            .value()
            .attr("id")
            .and_then(extract_release_id)
            .or_else(|| extract_release_id(&detail_url))?;

        let title = first_text(release, &sel.title, " ");
        let catalog_number = release
            .select(&sel.label)
            .next()
            .map(|label| catalog_text(&label))
            .unwrap_or_default();
        let tracklist = first_text(release, &sel.tracks, "\n");
        let price_text = first_text(release, &sel.price, " ");

        let status = first_text(release, &sel.status, " ");
        let availability_status = if status.is_empty() {
            price_text.clone()
        } else {
            status
        };

        let image_url = release
            .select(&sel.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve_url(base_url, src))
            .unwrap_or_default();

        let sample_count = release.select(&sel.sample).count();

        Some(ReleaseRecord {
            external_id,
            section_key: key,
            title,
            catalog_number,
            tracklist,
            price_text,
            detail_url,
            image_url,
            sample_urls: sample_urls(&self.config.catalog.cdn_url, external_id, sample_count),
            availability_status,
        })
    }

    fn second_page_url(&self, source_url: &str) -> String {
        format!(
            "{}{}",
            source_url.trim_end_matches('/'),
            self.config.catalog.page_two_suffix
        )
    }
}

#[async_trait]
impl ListingSource for ReleaseFetcher {
    async fn fetch(&self, section: &SectionDescriptor) -> Result<Vec<ReleaseRecord>> {
        let key = section.section_key;
        fetch_paginated(
            self.config.catalog.page_size,
            section.source_url.clone(),
            self.second_page_url(&section.source_url),
            |url| self.fetch_page(key, url),
        )
        .await
    }
}

/// Fetch the first page and, when it is exactly full, the second page.
///
/// Deeper pages are never requested. An item listed on both pages (the
/// listing shifted between requests) is kept once, at its first position.
pub async fn fetch_paginated<F, Fut>(
    page_size: usize,
    first_url: String,
    second_url: String,
    fetch_page: F,
) -> Result<Vec<ReleaseRecord>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<ReleaseRecord>>>,
{
    let mut records = fetch_page(first_url).await?;
    if records.len() == page_size {
        records.extend(fetch_page(second_url).await?);
    }

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.external_id));
    Ok(records)
}

/// Sample URLs on the CDN: `{id}.mp3`, then `{id}a.mp3`, `{id}b.mp3`, ...
pub fn sample_urls(cdn_url: &str, external_id: u64, count: usize) -> Vec<String> {
    let cdn = cdn_url.trim_end_matches('/');
    std::iter::once(String::new())
        .chain((b'a'..=b'z').map(|c| char::from(c).to_string()))
        .take(count)
        .map(|suffix| format!("{cdn}/{external_id}{suffix}.mp3"))
        .collect()
}

/// Render the label element as `{catalog number} – {label}`.
fn catalog_text(label: &ElementRef) -> String {
    let pieces: Vec<String> = label
        .text()
        .map(normalize_whitespace)
        .filter(|t| !t.is_empty())
        .collect();
    match pieces.as_slice() {
        [label_name, catalog_number, ..] => format!("{catalog_number} – {label_name}"),
        [only] => only.clone(),
        [] => String::new(),
    }
}

/// Text of the first match, with text nodes trimmed and joined.
fn first_text(scope: &ElementRef, selector: &Selector, separator: &str) -> String {
    scope
        .select(selector)
        .next()
        .map(|el| {
            el.text()
                .map(normalize_whitespace)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
