// src/models/selectors.rs

//! CSS selectors for scraping a release listing page.

use serde::{Deserialize, Serialize};

/// CSS selectors for scraping a release listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSelectors {
    /// Selector for each release container; its `id` attribute is the item id
    #[serde(default = "defaults::release")]
    pub release_selector: String,

    /// Selector for the artist/title element within a release
    #[serde(default = "defaults::title")]
    pub title_selector: String,

    /// Selector for the label + catalog number element
    #[serde(default = "defaults::label")]
    pub label_selector: String,

    #[serde(default = "defaults::tracks")]
    pub tracks_selector: String,

    #[serde(default = "defaults::price")]
    pub price_selector: String,

    /// Selector for sample play buttons (only counted)
    #[serde(default = "defaults::sample")]
    pub sample_selector: String,

    #[serde(default = "defaults::image")]
    pub image_selector: String,

    /// Selector for the detail page link
    #[serde(default = "defaults::link")]
    pub link_selector: String,

    /// Selector for the stock status; the price text is used when absent
    #[serde(default = "defaults::status")]
    pub status_selector: String,
}

mod defaults {
    pub fn release() -> String {
        "div.releaseGrid".into()
    }
    pub fn title() -> String {
        "p.artist".into()
    }
    pub fn label() -> String {
        "p.label".into()
    }
    pub fn tracks() -> String {
        "p.tracks".into()
    }
    pub fn price() -> String {
        "div.price".into()
    }
    pub fn sample() -> String {
        "a.btn-play".into()
    }
    pub fn image() -> String {
        "img".into()
    }
    pub fn link() -> String {
        "a[href]".into()
    }
    pub fn status() -> String {
        ".stock, .status".into()
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            release_selector: defaults::release(),
            title_selector: defaults::title(),
            label_selector: defaults::label(),
            tracks_selector: defaults::tracks(),
            price_selector: defaults::price(),
            sample_selector: defaults::sample(),
            image_selector: defaults::image(),
            link_selector: defaults::link(),
            status_selector: defaults::status(),
        }
    }
}
