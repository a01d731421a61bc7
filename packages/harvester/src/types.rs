//! Core data types for the harvester.
//!
//! These types represent the bibliographic entities exposed by a Visual
//! Library deployment: journals, their volumes and issues, and articles.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key naming one VL record (e.g. `"10771471"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap an identifier string. Validation happens at the API boundary.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Kind of entity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Periodical; children are volumes or issues.
    Journal,
    /// Volume or issue of a journal; children are articles.
    Issue,
    /// Article; normally a leaf.
    Article,
    /// No known marker found. Terminal, never expanded.
    Unknown,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Issue => "issue",
            Self::Article => "article",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an issue-kind record is a volume or a single issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    Volume,
    Issue,
}

/// One `mods:titleInfo` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleInfo {
    /// Language code of the title (e.g. `"ger"`), if tagged.
    pub language: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
}

impl TitleInfo {
    /// Title and subtitle joined as `"title: subtitle"`.
    ///
    /// # Examples
    /// ```
    /// use vl_harvester::types::TitleInfo;
    ///
    /// let info = TitleInfo {
    ///     language: None,
    ///     title: Some("Decheniana".to_string()),
    ///     subtitle: Some("Verhandlungen".to_string()),
    /// };
    /// assert_eq!(info.label().as_deref(), Some("Decheniana: Verhandlungen"));
    /// ```
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match (&self.title, &self.subtitle) {
            (Some(title), Some(subtitle)) => Some(format!("{title}: {subtitle}")),
            (Some(title), None) => Some(title.clone()),
            (None, _) => None,
        }
    }
}

/// Author of an article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub given_name: String,
    pub family_name: String,
}

/// Publishing body of a journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    pub name: String,
    /// Authority URI (e.g. a GND link).
    pub uri: Option<String>,
}

/// Downloadable file attached to a record. Contents are never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// METS file ID.
    pub id: String,
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

/// One scanned page of a record, from the physical structure map.
///
/// Each resolution is a reference to an image file; images are never
/// downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page ID without the `phys` prefix (e.g. `"9660761"`).
    pub id: String,
    /// Printed label (e.g. `"Seite 61"`).
    pub label: Option<String>,
    /// Position within the scanned sequence.
    pub order: Option<String>,
    pub thumbnail: Option<FileRef>,
    pub image_min_resolution: Option<FileRef>,
    pub image_default_resolution: Option<FileRef>,
    pub image_max_resolution: Option<FileRef>,
}

/// Printed page range of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: String,
    pub end: String,
}

/// Attributes specific to journals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDetails {
    pub publishers: Vec<Publisher>,
}

/// Attributes specific to volumes and issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub level: IssueLevel,
    /// Volume or issue number as printed (e.g. `"95 A"`).
    pub number: Option<String>,
    /// Identifier of the containing record.
    pub journal_id: Option<Identifier>,
}

/// Attributes specific to articles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDetails {
    pub authors: Vec<Author>,
    pub page_range: Option<PageRange>,
    pub volume_number: Option<String>,
    pub issue_number: Option<String>,
}

/// Kind-specific part of an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetails {
    Journal(JournalDetails),
    Issue(IssueDetails),
    Article(ArticleDetails),
    Unknown,
}

impl EntityDetails {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Journal(_) => EntityKind::Journal,
            Self::Issue(_) => EntityKind::Issue,
            Self::Article(_) => EntityKind::Article,
            Self::Unknown => EntityKind::Unknown,
        }
    }
}

/// One resolved VL record.
///
/// Every scalar attribute is optional: a record missing a field still
/// resolves, with that field unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Identifier,

    /// `setSpec` values from the OAI header.
    pub set_spec: Vec<String>,

    /// `LABEL` of the record's own structure division.
    pub label: Option<String>,

    /// `ORDER` of the record's own structure division.
    pub order: Option<String>,

    pub title: Option<String>,
    pub subtitle: Option<String>,

    /// All title infos, including translated titles.
    pub titles: Vec<TitleInfo>,

    /// Full label of the journal the record belongs to.
    pub journal_label: Option<String>,

    /// Earliest key date as given in the record (e.g. `"1937-1954"`).
    pub publication_date: Option<String>,

    pub languages: Vec<String>,
    pub keywords: Vec<String>,

    /// License URI, or the license statement when no URI is given.
    pub license: Option<String>,

    /// Public landing page of the record.
    pub url: Option<String>,

    pub files: Vec<FileRef>,
    pub pdf_url: Option<String>,
    pub teaser_image_url: Option<String>,

    /// Scanned pages linked to the record, in linking order.
    pub pages: Vec<Page>,

    /// Records this one contains, in document order.
    pub children: Vec<Identifier>,

    /// Containing record as named by this record's own document.
    pub parent: Option<Identifier>,

    #[serde(flatten)]
    pub details: EntityDetails,
}

impl Entity {
    /// Create an entity with no attributes and no children.
    pub fn new(id: impl Into<Identifier>, details: EntityDetails) -> Self {
        Self {
            id: id.into(),
            set_spec: Vec::new(),
            label: None,
            order: None,
            title: None,
            subtitle: None,
            titles: Vec::new(),
            journal_label: None,
            publication_date: None,
            languages: Vec::new(),
            keywords: Vec::new(),
            license: None,
            url: None,
            files: Vec::new(),
            pdf_url: None,
            teaser_image_url: None,
            pages: Vec::new(),
            children: Vec::new(),
            parent: None,
            details,
        }
    }

    /// Entity for a record no marker matched.
    pub fn unknown(id: impl Into<Identifier>) -> Self {
        Self::new(id, EntityDetails::Unknown)
    }

    /// Kind assigned by the classifier.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.details.kind()
    }

    /// Whether the record lists no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn journal(&self) -> Option<&JournalDetails> {
        match &self.details {
            EntityDetails::Journal(details) => Some(details),
            _ => None,
        }
    }

    #[must_use]
    pub fn issue(&self) -> Option<&IssueDetails> {
        match &self.details {
            EntityDetails::Issue(details) => Some(details),
            _ => None,
        }
    }

    #[must_use]
    pub fn article(&self) -> Option<&ArticleDetails> {
        match &self.details {
            EntityDetails::Article(details) => Some(details),
            _ => None,
        }
    }

    /// Page with the given ID, with or without its `phys` prefix.
    #[must_use]
    pub fn page(&self, id: &str) -> Option<&Page> {
        let id = id.strip_prefix("phys").unwrap_or(id);
        self.pages.iter().find(|page| page.id == id)
    }

    /// Title for the given language code, falling back to the primary title.
    #[must_use]
    pub fn title_in(&self, language: &str) -> Option<&str> {
        self.titles
            .iter()
            .find(|info| info.language.as_deref() == Some(language))
            .and_then(|info| info.title.as_deref())
            .or(self.title.as_deref())
    }
}
