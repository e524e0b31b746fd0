//! Normalization engine: raw harvested payloads → relational record graph.
//!
//! ```text
//! catalog ─┐
//!          ├─▶ IdentitySet ─┐
//! details ─┘                ├─▶ GameRecord* ─┐
//!                           │                ├─▶ NormalizedGraph
//! news (list of lists) ─────┴─▶ NewsRecord* ─┘
//! ```
//!
//! Games are normalized before news items so a single resolver pass assigns
//! ids deterministically for a fixed input order. Records outside the
//! identity set, repeated identities (first seen wins), and records that
//! cannot be identified are skipped and counted in the
//! [`NormalizeReport`](crate::models::NormalizeReport); none of them leaves
//! a core row, dimension entry, or association behind.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::models::{
    CatalogEntry, CompanyRoles, Dimension, Game, GameRecord, NewsItem, NewsRecord,
    NormalizeReport, NormalizedGraph,
};
use crate::raw::{RawGame, RawNewsItem};
use crate::resolver::NaturalKeyResolver;

/// Store-page text for a release without a date yet.
pub const COMING_SOON: &str = "Coming soon";

/// Store-page release date format, e.g. `Nov 1, 2000`.
pub const RELEASE_DATE_FORMAT: &str = "%b %d, %Y";

/// The accepted primary ids: known to the catalog and present in the
/// details artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    ids: HashSet<i64>,
}

impl IdentitySet {
    pub fn from_sources(catalog: &[CatalogEntry], details: &[Value]) -> Self {
        let catalog_ids: HashSet<i64> = catalog.iter().map(|e| e.appid).collect();
        let ids = details
            .iter()
            .filter_map(|d| RawGame::new(d).appid())
            .filter(|id| catalog_ids.contains(id))
            .collect();
        Self { ids }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<i64> for IdentitySet {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Parsed store-page release date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseDate {
    pub date: Option<NaiveDate>,
    pub coming_soon: bool,
}

/// Interpret the store page's release date text.
///
/// Only the exact text [`COMING_SOON`] raises `coming_soon`. Other
/// placeholders such as "To be announced" or "Q2 2025" fail to parse and
/// produce a null date with the flag left false.
pub fn parse_release_date(raw: Option<&str>) -> ReleaseDate {
    let text = raw.map(str::trim).unwrap_or_default();
    if text == COMING_SOON {
        return ReleaseDate {
            date: None,
            coming_soon: true,
        };
    }
    ReleaseDate {
        date: NaiveDate::parse_from_str(text, RELEASE_DATE_FORMAT).ok(),
        coming_soon: false,
    }
}

/// Convert epoch seconds to a UTC calendar date-time.
pub fn epoch_to_datetime(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// Normalize every harvested dataset in one resolver scope.
pub fn normalize(catalog: &[CatalogEntry], details: &[Value], news: &[Value]) -> NormalizedGraph {
    let identities = IdentitySet::from_sources(catalog, details);
    let names: HashMap<i64, &str> = catalog
        .iter()
        .map(|e| (e.appid, e.name.as_str()))
        .collect();

    let mut engine = Normalizer::new(&identities);
    for record in details {
        engine.push_game(record, &names);
    }
    for batch in news {
        match batch.as_array() {
            Some(items) => items.iter().for_each(|item| engine.push_news_item(item)),
            None => engine.push_news_item(batch),
        }
    }
    engine.finish()
}

/// Incremental normalization state for a single run.
///
/// Seen-identity sets and role sets live here rather than in ambient
/// state, so two runs never share ids.
pub struct Normalizer<'a> {
    identities: &'a IdentitySet,
    resolver: NaturalKeyResolver,
    seen_appids: HashSet<i64>,
    seen_gids: HashSet<i64>,
    roles: CompanyRoles,
    games: Vec<GameRecord>,
    news: Vec<NewsRecord>,
    report: NormalizeReport,
}

impl<'a> Normalizer<'a> {
    pub fn new(identities: &'a IdentitySet) -> Self {
        Self {
            identities,
            resolver: NaturalKeyResolver::new(),
            seen_appids: HashSet::new(),
            seen_gids: HashSet::new(),
            roles: CompanyRoles::default(),
            games: Vec::new(),
            news: Vec::new(),
            report: NormalizeReport::default(),
        }
    }

    /// Decompose one store-page payload. `names` supplies the catalog name.
    pub fn push_game(&mut self, value: &Value, names: &HashMap<i64, &str>) {
        let raw = RawGame::new(value);
        let Some(appid) = raw.appid() else {
            warn!("skipping game record without appid");
            self.report.games_invalid += 1;
            return;
        };
        if !self.identities.contains(appid) {
            trace!(appid, "game outside identity set");
            self.report.games_outside_identity_set += 1;
            return;
        }
        if !self.seen_appids.insert(appid) {
            debug!(appid, "duplicate game record skipped");
            self.report.games_duplicate += 1;
            return;
        }

        let developers = self
            .resolver
            .resolve_all(Dimension::Company, raw.developers());
        let publishers = self
            .resolver
            .resolve_all(Dimension::Company, raw.publishers());
        let tags = self.resolver.resolve_all(Dimension::GameTag, raw.tags());
        let features = self.resolver.resolve_all(Dimension::Feature, raw.features());

        let release = parse_release_date(raw.release_date());
        let game = Game {
            appid,
            name: names.get(&appid).copied().unwrap_or_default().to_string(),
            description_snippet: raw.description_snippet(),
            release_date: release.date,
            coming_soon: release.coming_soon,
            price: raw.price(),
            description: raw.description(),
            all_positive_review_pct: raw.all_positive_review_pct(),
            total_num_reviews: raw.total_num_reviews(),
            recent_positive_review_pct: raw.recent_positive_review_pct(),
            recent_num_reviews: raw.recent_num_reviews(),
        };

        self.report.games_accepted += 1;
        self.games.push(GameRecord {
            game,
            developers,
            publishers,
            tags,
            features,
        });
    }

    /// Decompose one news item.
    pub fn push_news_item(&mut self, value: &Value) {
        let raw = RawNewsItem::new(value);
        let (Some(gid), Some(appid)) = (raw.gid(), raw.appid()) else {
            warn!(gid = ?value.get("gid"), "skipping news item without gid or appid");
            self.report.news_invalid += 1;
            return;
        };
        if !self.identities.contains(appid) {
            trace!(gid, appid, "news item outside identity set");
            self.report.news_outside_identity_set += 1;
            return;
        }
        if self.seen_gids.contains(&gid) {
            debug!(gid, "duplicate news item skipped");
            self.report.news_duplicate += 1;
            return;
        }
        let Some(date) = raw.date().and_then(epoch_to_datetime) else {
            warn!(gid, date = ?value.get("date"), "skipping news item with unconvertible date");
            self.report.news_invalid += 1;
            return;
        };
        self.seen_gids.insert(gid);

        let tags = self
            .resolver
            .resolve_all(Dimension::NewsitemTag, raw.tags());
        let item = NewsItem {
            gid,
            title: raw.title().to_string(),
            url: raw.url().to_string(),
            is_external_url: raw.is_external_url(),
            author_id: self.resolver.resolve_opt(Dimension::Author, raw.author()),
            contents: raw.contents().to_string(),
            feedlabel_id: self
                .resolver
                .resolve_opt(Dimension::Feedlabel, raw.feedlabel()),
            date,
            feedname_id: self
                .resolver
                .resolve_opt(Dimension::Feedname, raw.feedname()),
            feed_type: raw.feed_type(),
            appid,
        };

        self.report.news_accepted += 1;
        self.news.push(NewsRecord { item, tags });
    }

    /// Run the company-role pass and hand back the graph.
    pub fn finish(mut self) -> NormalizedGraph {
        for record in &self.games {
            self.roles.developers.extend(&record.developers);
            self.roles.publishers.extend(&record.publishers);
        }
        NormalizedGraph {
            games: self.games,
            news: self.news,
            dimensions: self.resolver.into_tables(),
            roles: self.roles,
            report: self.report,
        }
    }
}

/// Distinct appids referenced by normalized games.
pub fn loaded_appids(graph: &NormalizedGraph) -> BTreeSet<i64> {
    graph.games.iter().map(|g| g.game.appid).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(ids: &[i64]) -> Vec<CatalogEntry> {
        ids.iter()
            .map(|&appid| CatalogEntry {
                appid,
                name: format!("App {appid}"),
            })
            .collect()
    }

    #[test]
    fn release_date_formats() {
        let parsed = parse_release_date(Some("Nov 1, 2000"));
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2000, 11, 1));
        assert!(!parsed.coming_soon);

        let soon = parse_release_date(Some(" Coming soon "));
        assert_eq!(soon.date, None);
        assert!(soon.coming_soon);

        for text in ["Q2 2025", "To be announced", "coming soon", ""] {
            let parsed = parse_release_date(Some(text));
            assert_eq!(parsed.date, None, "{text}");
            assert!(!parsed.coming_soon, "{text}");
        }
        assert_eq!(parse_release_date(None).date, None);
    }

    #[test]
    fn coming_soon_scenario() {
        let details = vec![json!({
            "appid": 7,
            "developers": ["Acme", "Acme "],
            "tags": ["RPG", "+"],
            "release_date": "Coming soon",
        })];
        let graph = normalize(&catalog(&[7]), &details, &[]);

        assert_eq!(graph.games.len(), 1);
        let record = &graph.games[0];
        assert_eq!(record.game.appid, 7);
        assert!(record.game.coming_soon);
        assert_eq!(record.game.release_date, None);
        assert_eq!(record.game.name, "App 7");
        assert_eq!(record.developers, vec![1]);
        assert_eq!(record.tags, vec![1]);

        let companies = graph.dimensions.values(Dimension::Company);
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].key, "Acme");
        let tags = graph.dimensions.values(Dimension::GameTag);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].key, "RPG");
    }

    #[test]
    fn records_outside_identity_set_leave_nothing() {
        // 8 is in the details but not the catalog; 9 is in the catalog only.
        let details = vec![
            json!({ "appid": 8, "developers": ["Ghost"], "tags": ["Horror"] }),
            json!({ "appid": 7, "developers": ["Acme"] }),
        ];
        let news = vec![json!([
            { "gid": "1", "appid": 8, "date": 0, "author": "nobody", "tags": ["patch"] },
            { "gid": "2", "appid": 9, "date": 0, "feedlabel": "x" },
        ])];
        let graph = normalize(&catalog(&[7, 9]), &details, &news);

        assert_eq!(graph.games.len(), 1);
        assert!(graph.news.is_empty());
        assert_eq!(graph.dimensions.len(Dimension::Company), 1);
        assert_eq!(graph.dimensions.len(Dimension::GameTag), 0);
        assert_eq!(graph.dimensions.len(Dimension::Author), 0);
        assert_eq!(graph.dimensions.len(Dimension::NewsitemTag), 0);
        assert_eq!(graph.dimensions.len(Dimension::Feedlabel), 0);
        assert_eq!(graph.report.games_outside_identity_set, 1);
        assert_eq!(graph.report.news_outside_identity_set, 2);
    }

    #[test]
    fn duplicate_news_gid_first_wins() {
        let details = vec![json!({ "appid": 7 })];
        let news = vec![
            json!([{ "gid": "42", "appid": 7, "date": 1_700_000_000, "title": "first", "tags": ["a"] }]),
            json!([{ "gid": 42, "appid": 7, "date": 1_700_000_001, "title": "second", "tags": ["b"] }]),
        ];
        let graph = normalize(&catalog(&[7]), &details, &news);

        assert_eq!(graph.news.len(), 1);
        assert_eq!(graph.news[0].item.title, "first");
        assert_eq!(graph.news[0].tags, vec![1]);
        assert_eq!(graph.dimensions.len(Dimension::NewsitemTag), 1);
        assert_eq!(graph.report.news_duplicate, 1);
    }

    #[test]
    fn duplicate_game_first_wins() {
        let details = vec![
            json!({ "appid": 7, "price": 9.99, "features": ["Single-player"] }),
            json!({ "appid": 7, "price": 1.0, "features": ["Co-op"] }),
        ];
        let graph = normalize(&catalog(&[7]), &details, &[]);
        assert_eq!(graph.games.len(), 1);
        assert_eq!(graph.games[0].game.price, Some(9.99));
        assert_eq!(graph.dimensions.len(Dimension::Feature), 1);
        assert_eq!(graph.report.games_duplicate, 1);
    }

    #[test]
    fn news_optional_dimensions() {
        let details = vec![json!({ "appid": 7 })];
        let news = vec![json!([
            { "gid": "1", "appid": 7, "date": 0, "author": "  ", "feedlabel": "Community Announcements", "feedname": "steam_community_announcements", "feed_type": 1 },
            { "gid": "2", "appid": 7, "date": 86_400, "author": "Gabe", "feedlabel": "Community Announcements" },
        ])];
        let graph = normalize(&catalog(&[7]), &details, &news);

        let first = &graph.news[0].item;
        assert_eq!(first.author_id, None);
        assert_eq!(first.feedlabel_id, Some(1));
        assert_eq!(first.feedname_id, Some(1));
        assert_eq!(first.feed_type, 1);
        assert_eq!(
            first.date,
            NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap()
        );

        let second = &graph.news[1].item;
        assert_eq!(second.author_id, Some(1));
        assert_eq!(second.feedlabel_id, Some(1));
        assert_eq!(second.feedname_id, None);
    }

    #[test]
    fn unconvertible_date_skips_record() {
        let details = vec![json!({ "appid": 7 })];
        let news = vec![json!([
            { "gid": "1", "appid": 7, "date": i64::MAX, "tags": ["x"] },
            { "gid": "2", "appid": 7 },
        ])];
        let graph = normalize(&catalog(&[7]), &details, &news);
        assert!(graph.news.is_empty());
        assert_eq!(graph.report.news_invalid, 2);
        assert_eq!(graph.dimensions.len(Dimension::NewsitemTag), 0);
    }

    #[test]
    fn company_roles_after_all_records() {
        let details = vec![
            json!({ "appid": 1, "developers": ["Both"], "publishers": ["PubOnly"] }),
            json!({ "appid": 2, "developers": ["DevOnly"], "publishers": ["Both"] }),
        ];
        let graph = normalize(&catalog(&[1, 2]), &details, &[]);
        let companies = graph.companies();
        let by_name = |name: &str| companies.iter().find(|c| c.company == name).unwrap();

        let both = by_name("Both");
        assert!(both.is_developer && both.is_publisher);
        let pub_only = by_name("PubOnly");
        assert!(!pub_only.is_developer && pub_only.is_publisher);
        let dev_only = by_name("DevOnly");
        assert!(dev_only.is_developer && !dev_only.is_publisher);
    }

    #[test]
    fn ids_deterministic_for_fixed_order() {
        let details = vec![
            json!({ "appid": 1, "tags": ["b", "a"] }),
            json!({ "appid": 2, "tags": ["c", "a"] }),
        ];
        let first = normalize(&catalog(&[1, 2]), &details, &[]);
        let second = normalize(&catalog(&[1, 2]), &details, &[]);
        assert_eq!(first, second);
        assert_eq!(first.games[1].tags, vec![3, 2]);
    }

    #[test]
    fn input_is_not_mutated() {
        let details = vec![json!({ "appid": 7, "developers": ["Acme"], "tags": ["+"] })];
        let before = details.clone();
        let _ = normalize(&catalog(&[7]), &details, &[]);
        assert_eq!(details, before);
    }
}
