use std::fmt;

use serde::{Deserialize, Serialize};

/// A language tag under which the store keeps a separate record per item.
///
/// `code` is the tag the store uses; `document_suffix` names the README
/// variant read for it (`None` means the default `README.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locale {
    pub code: &'static str,
    pub document_suffix: Option<&'static str>,
}

impl Locale {
    pub const EN: Locale = Locale {
        code: "en",
        document_suffix: None,
    };

    // The Czech README has always been published as README.cz.md.
    pub const CS: Locale = Locale {
        code: "cs",
        document_suffix: Some("cz"),
    };

    pub const DEFAULT: Locale = Locale::EN;

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// File name of the README document for this locale.
    pub fn document_name(&self) -> String {
        match self.document_suffix {
            Some(suffix) => format!("README.{}.md", suffix),
            None => "README.md".to_string(),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

/// Locales kept in the store, default first.
pub const SUPPORTED_LOCALES: [Locale; 2] = [Locale::EN, Locale::CS];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Language {
    #[serde(rename = "language")]
    pub name: String,
    pub color: Option<String>,
    pub ratio: f32,
}

/// A pinned repository as reported upstream, normalized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    pub star_count: u32,
    pub homepage_url: Option<String>,
    pub repo_url: String,
    pub license: Option<String>,
    pub download_count: Option<u64>,
    pub languages: Vec<Language>,
}

/// The store payload for one (item, locale) pair.
///
/// Field names follow the store's content type. `None` serializes as `null`
/// so that values removed upstream are cleared on update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocalizedRecord {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "stars")]
    pub star_count: u32,
    #[serde(rename = "homepageURL")]
    pub homepage_url: Option<String>,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub license: Option<String>,
    #[serde(rename = "downloads")]
    pub download_count: Option<u64>,
    #[serde(rename = "imgURL")]
    pub image_url: Option<String>,
    #[serde(rename = "lang")]
    pub languages: Vec<Language>,
    #[serde(rename = "readme")]
    pub readme_body: Option<String>,
    pub locale: String,
}

impl LocalizedRecord {
    pub fn new(item: &Item, locale: &Locale) -> Self {
        Self {
            title: item.title.clone(),
            description: None,
            star_count: item.star_count,
            homepage_url: item.homepage_url.clone(),
            repo_url: item.repo_url.clone(),
            license: item.license.clone(),
            download_count: item.download_count,
            image_url: None,
            languages: item.languages.clone(),
            readme_body: None,
            locale: locale.code.to_string(),
        }
    }
}

/// What the store knows about an existing record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: u64,
    pub title: String,
    pub locale: String,
}
