// src/models/section.rs

//! Catalog sections: genre × listing pairs and their source URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::CatalogConfig;

/// A subscribable genre group on the catalog site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    BassMusic,
    DrumAndBass,
    Experimental,
    FunkHipHopSoul,
    HouseDisco,
    Reggae,
    TechnoElectro,
    BalearicAndDowntempo,
    AlternativeIndieFolkPunk,
}

impl Genre {
    pub const ALL: [Genre; 9] = [
        Genre::BassMusic,
        Genre::DrumAndBass,
        Genre::Experimental,
        Genre::FunkHipHopSoul,
        Genre::HouseDisco,
        Genre::Reggae,
        Genre::TechnoElectro,
        Genre::BalearicAndDowntempo,
        Genre::AlternativeIndieFolkPunk,
    ];

    /// Stable identifier used in keys and config files.
    pub fn id(&self) -> &'static str {
        match self {
            Genre::BassMusic => "bass_music",
            Genre::DrumAndBass => "drum_and_bass",
            Genre::Experimental => "experimental",
            Genre::FunkHipHopSoul => "funk_hip_hop_soul",
            Genre::HouseDisco => "house_disco",
            Genre::Reggae => "reggae",
            Genre::TechnoElectro => "techno_electro",
            Genre::BalearicAndDowntempo => "balearic_and_downtempo",
            Genre::AlternativeIndieFolkPunk => "alternative_indie_folk_punk",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Genre::BassMusic => "BASS MUSIC",
            Genre::DrumAndBass => "DRUM & BASS • JUNGLE",
            Genre::Experimental => "AMBIENT • EXPERIMENTAL • DRONE",
            Genre::FunkHipHopSoul => "HIP HOP • SOUL • JAZZ • FUNK",
            Genre::HouseDisco => "HOUSE • DISCO",
            Genre::Reggae => "REGGAE",
            Genre::TechnoElectro => "TECHNO • ELECTRO",
            Genre::BalearicAndDowntempo => "BALEARIC • DOWNTEMPO",
            Genre::AlternativeIndieFolkPunk => "ALTERNATIVE / INDIE / FOLK / PUNK",
        }
    }

    /// URL path segment on the catalog site.
    pub fn slug(&self) -> String {
        self.id().replace('_', "-")
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Genre {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Genre::ALL
            .into_iter()
            .find(|g| g.id() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown genre '{s}'")))
    }
}

/// A listing type within a genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    Preorders,
    New,
    Discount30,
    Discount50,
    Discount75,
}

impl Listing {
    pub const ALL: [Listing; 5] = [
        Listing::Preorders,
        Listing::New,
        Listing::Discount30,
        Listing::Discount50,
        Listing::Discount75,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Listing::Preorders => "preorders",
            Listing::New => "new",
            Listing::Discount30 => "discount30",
            Listing::Discount50 => "discount50",
            Listing::Discount75 => "discount75",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Listing::Preorders => "PRE-ORDER",
            Listing::New => "NEW RELEASE",
            Listing::Discount30 => "30% SALE",
            Listing::Discount50 => "50% SALE",
            Listing::Discount75 => "75% SALE",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Listing::Preorders => "pre-orders",
            Listing::New => "new-releases",
            Listing::Discount30 => "sale-section",
            Listing::Discount50 => "super-sale-section",
            Listing::Discount75 => "super-super-sale-section",
        }
    }

    /// Discount listings, where sold-out items are not announced.
    pub fn is_sale(&self) -> bool {
        matches!(
            self,
            Listing::Discount30 | Listing::Discount50 | Listing::Discount75
        )
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Listing {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Listing::ALL
            .into_iter()
            .find(|l| l.id() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown listing '{s}'")))
    }
}

/// Identifies one section partition, rendered as `{genre}_{listing}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionKey {
    pub genre: Genre,
    pub listing: Listing,
}

impl SectionKey {
    pub fn new(genre: Genre, listing: Listing) -> Self {
        Self { genre, listing }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.genre.id(), self.listing.id())
    }
}

impl FromStr for SectionKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        // Genre ids contain underscores, listing ids never do.
        let (genre, listing) = s
            .rsplit_once('_')
            .ok_or_else(|| AppError::validation(format!("Malformed section key '{s}'")))?;
        Ok(Self::new(genre.parse()?, listing.parse()?))
    }
}

impl Serialize for SectionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SectionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One watched section with its source URL and display labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDescriptor {
    pub section_key: SectionKey,

    /// Subscription flag that receives this section's releases
    pub group: Genre,

    pub source_url: String,

    /// Listing label shown under the genre label in messages
    pub display_label: String,
}

impl SectionDescriptor {
    pub fn new(base_url: &str, key: SectionKey) -> Self {
        Self {
            section_key: key,
            group: key.genre,
            source_url: format!(
                "{}/{}/{}",
                base_url.trim_end_matches('/'),
                key.genre.slug(),
                key.listing.path()
            ),
            display_label: key.listing.label().to_string(),
        }
    }

    pub fn is_sale(&self) -> bool {
        self.section_key.listing.is_sale()
    }
}

/// The set of sections watched in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionCatalog {
    pub sections: Vec<SectionDescriptor>,
}

impl SectionCatalog {
    /// Build descriptors for every enabled genre × listing pair.
    pub fn discover(config: &CatalogConfig) -> Self {
        let sections = config
            .genres
            .iter()
            .flat_map(|genre| {
                config
                    .listings
                    .iter()
                    .map(move |listing| SectionKey::new(*genre, *listing))
            })
            .map(|key| SectionDescriptor::new(&config.base_url, key))
            .collect();
        Self { sections }
    }

    pub fn get(&self, key: &SectionKey) -> Option<&SectionDescriptor> {
        self.sections.iter().find(|s| &s.section_key == key)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_key_round_trip() {
        let key = SectionKey::new(Genre::TechnoElectro, Listing::New);
        assert_eq!(key.to_string(), "techno_electro_new");
        assert_eq!("techno_electro_new".parse::<SectionKey>().unwrap(), key);

        let key: SectionKey = "alternative_indie_folk_punk_discount75".parse().unwrap();
        assert_eq!(key.genre, Genre::AlternativeIndieFolkPunk);
        assert_eq!(key.listing, Listing::Discount75);
    }

    #[test]
    fn test_section_key_rejects_unknown_identifiers() {
        assert!("techno_new".parse::<SectionKey>().is_err());
        assert!("techno_electro_bargains".parse::<SectionKey>().is_err());
        assert!("users; DROP TABLE".parse::<SectionKey>().is_err());
        assert!("".parse::<SectionKey>().is_err());
    }

    #[test]
    fn test_descriptor_url() {
        let key = SectionKey::new(Genre::DrumAndBass, Listing::Discount50);
        let desc = SectionDescriptor::new("https://www.redeyerecords.co.uk/", key);
        assert_eq!(
            desc.source_url,
            "https://www.redeyerecords.co.uk/drum-and-bass/super-sale-section"
        );
        assert_eq!(desc.group, Genre::DrumAndBass);
        assert_eq!(desc.display_label, "50% SALE");
        assert!(desc.is_sale());
    }

    #[test]
    fn test_discover_all_sections() {
        let catalog = SectionCatalog::discover(&CatalogConfig::default());
        assert_eq!(catalog.len(), Genre::ALL.len() * Listing::ALL.len());

        let key = SectionKey::new(Genre::Reggae, Listing::Preorders);
        assert_eq!(
            catalog.get(&key).map(|s| s.source_url.as_str()),
            Some("https://www.redeyerecords.co.uk/reggae/pre-orders")
        );
    }

    #[test]
    fn test_section_key_serializes_as_string() {
        let key = SectionKey::new(Genre::HouseDisco, Listing::Discount30);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"house_disco_discount30\"");
        let back: SectionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
