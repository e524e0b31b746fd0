//! Relational record model produced by normalization and consumed by the
//! load coordinator.
//!
//! Core entities ([`Game`], [`NewsItem`]) hold scalar attributes only.
//! Multi-valued attributes are carried next to them as lists of surrogate
//! ids ([`GameRecord`], [`NewsRecord`]) that reference the deduplicated
//! dimension tables in [`DimensionTables`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One `{appid, name}` entry of the app catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub appid: i64,
    pub name: String,
}

/// A deduplicated lookup table keyed by natural-language value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Company,
    GameTag,
    Feature,
    Author,
    Feedlabel,
    Feedname,
    NewsitemTag,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Company,
        Dimension::GameTag,
        Dimension::Feature,
        Dimension::Author,
        Dimension::Feedlabel,
        Dimension::Feedname,
        Dimension::NewsitemTag,
    ];

    /// Relational table backing this dimension.
    pub fn table(&self) -> &'static str {
        match self {
            Dimension::Company => "companies",
            Dimension::GameTag => "game_tag_enumerations",
            Dimension::Feature => "feature_enumerations",
            Dimension::Author => "authors",
            Dimension::Feedlabel => "feedlabels",
            Dimension::Feedname => "feednames",
            Dimension::NewsitemTag => "newsitem_tag_enumerations",
        }
    }

    /// Surrogate key column of [`table`](Self::table).
    pub fn id_column(&self) -> &'static str {
        match self {
            Dimension::Company => "company_id",
            Dimension::GameTag => "game_tag_enumeration_id",
            Dimension::Feature => "feature_enumeration_id",
            Dimension::Author => "author_id",
            Dimension::Feedlabel => "feedlabel_id",
            Dimension::Feedname => "feedname_id",
            Dimension::NewsitemTag => "newsitem_tag_enumeration_id",
        }
    }

    /// Natural key column of [`table`](Self::table).
    pub fn key_column(&self) -> &'static str {
        match self {
            Dimension::Company => "company",
            Dimension::GameTag | Dimension::NewsitemTag => "tag",
            Dimension::Feature => "feature",
            Dimension::Author => "author",
            Dimension::Feedlabel => "feedlabel",
            Dimension::Feedname => "feedname",
        }
    }

    /// Placeholder values that are artifacts of the source rather than data.
    ///
    /// The store page renders a "+" control after the tag list; it is scraped
    /// as if it were a tag.
    pub fn denylist(&self) -> &'static [&'static str] {
        match self {
            Dimension::GameTag => &["+"],
            _ => &[],
        }
    }
}

/// A natural key and the surrogate id it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionValue {
    pub id: i64,
    pub key: String,
}

/// Company row as persisted, including the role flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub company_id: i64,
    pub company: String,
    pub is_developer: bool,
    pub is_publisher: bool,
}

/// Core row for one app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Game {
    pub appid: i64,
    pub name: String,
    pub description_snippet: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub coming_soon: bool,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub all_positive_review_pct: Option<i64>,
    pub total_num_reviews: Option<i64>,
    pub recent_positive_review_pct: Option<i64>,
    pub recent_num_reviews: Option<i64>,
}

/// Core row for one news item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub gid: i64,
    pub title: String,
    pub url: String,
    pub is_external_url: bool,
    pub author_id: Option<i64>,
    pub contents: String,
    pub feedlabel_id: Option<i64>,
    pub date: NaiveDateTime,
    pub feedname_id: Option<i64>,
    pub feed_type: i64,
    pub appid: i64,
}

/// A game plus the surrogate ids of everything linked to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRecord {
    pub game: Game,
    pub developers: Vec<i64>,
    pub publishers: Vec<i64>,
    pub tags: Vec<i64>,
    pub features: Vec<i64>,
}

/// A news item plus its tag links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsRecord {
    pub item: NewsItem,
    pub tags: Vec<i64>,
}

/// Every dimension table allocated during one normalization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionTables {
    tables: BTreeMap<Dimension, Vec<DimensionValue>>,
}

impl DimensionTables {
    pub fn new(tables: BTreeMap<Dimension, Vec<DimensionValue>>) -> Self {
        Self { tables }
    }

    /// Values of one dimension in allocation order (ids `1..=n`).
    pub fn values(&self, dimension: Dimension) -> &[DimensionValue] {
        self.tables
            .get(&dimension)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, dimension: Dimension) -> usize {
        self.values(dimension).len()
    }

    /// Whether `id` was allocated in `dimension`.
    pub fn contains(&self, dimension: Dimension, id: i64) -> bool {
        self.values(dimension)
            .binary_search_by_key(&id, |v| v.id)
            .is_ok()
    }
}

/// Company ids observed in each role over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyRoles {
    pub developers: BTreeSet<i64>,
    pub publishers: BTreeSet<i64>,
}

/// Data-quality counters for one normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub games_accepted: u64,
    pub games_outside_identity_set: u64,
    pub games_duplicate: u64,
    pub games_invalid: u64,
    pub news_accepted: u64,
    pub news_outside_identity_set: u64,
    pub news_duplicate: u64,
    pub news_invalid: u64,
}

/// Output of the normalization engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedGraph {
    pub games: Vec<GameRecord>,
    pub news: Vec<NewsRecord>,
    pub dimensions: DimensionTables,
    pub roles: CompanyRoles,
    pub report: NormalizeReport,
}

impl NormalizedGraph {
    /// Company rows with role flags applied.
    pub fn companies(&self) -> Vec<Company> {
        self.dimensions
            .values(Dimension::Company)
            .iter()
            .map(|v| Company {
                company_id: v.id,
                company: v.key.clone(),
                is_developer: self.roles.developers.contains(&v.id),
                is_publisher: self.roles.publishers.contains(&v.id),
            })
            .collect()
    }
}
