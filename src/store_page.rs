//! Store-page scraper for the `details` dataset.
//!
//! `GET {store_base}/app/{appid}` is parsed into a flat JSON object whose keys
//! are the raw field names the normalizer reads (`developers`, `tags`,
//! `release_date`, `price`, ...). Fields missing from the page are left out
//! rather than written as null. An appid that redirects to the store front
//! page is reported as [`FetchOutcome::Absent`].

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};

use crate::steam_api::{classify_error, classify_status};
use crate::traits::{FetchError, FetchOutcome, Fetcher};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static HOME_PAGE: LazyLock<Selector> = LazyLock::new(|| selector(".home_page_col_wrapper"));
static REVIEW_DESC: LazyLock<Selector> =
    LazyLock::new(|| selector(".responsive_reviewdesc_short"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static SNIPPET: LazyLock<Selector> = LazyLock::new(|| selector(".game_description_snippet"));
static DEV_ROW: LazyLock<Selector> = LazyLock::new(|| selector(".dev_row"));
static DEV_SUBTITLE: LazyLock<Selector> = LazyLock::new(|| selector(".subtitle.column"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static RELEASE_DATE: LazyLock<Selector> = LazyLock::new(|| selector(".release_date .date"));
static APP_TAG: LazyLock<Selector> = LazyLock::new(|| selector(".app_tag"));
static PURCHASE: LazyLock<Selector> = LazyLock::new(|| selector(".game_purchase_action_bg"));
static ORIGINAL_PRICE: LazyLock<Selector> =
    LazyLock::new(|| selector(".discount_original_price"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| selector(".game_purchase_price.price"));
static FEATURE: LazyLock<Selector> = LazyLock::new(|| selector("a.game_area_details_specs_ctn"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(".game_area_description"));

static REVIEW_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)% of ([\d,]+)\)").expect("static regex"));
static PRICE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d{2})").expect("static regex"));

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Distinct trimmed texts in document order.
fn distinct_texts<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for text in elements.map(text_of) {
        if !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

/// Whether the document is the store front page rather than an app page.
pub fn is_home_page(doc: &Html) -> bool {
    doc.select(&HOME_PAGE).next().is_some()
}

/// Extract every known field from an app page.
pub fn parse_page(appid: i64, doc: &Html) -> Value {
    let mut page = Map::new();
    page.insert("appid".into(), json!(appid));

    for desc in doc.select(&REVIEW_DESC) {
        let text = desc.text().collect::<String>();
        let Some(caps) = REVIEW_SUMMARY.captures(&text) else {
            continue;
        };
        let (Ok(pct), Ok(count)) = (
            caps[1].parse::<i64>(),
            caps[2].replace(',', "").parse::<i64>(),
        ) else {
            continue;
        };
        let label = desc.select(&SPAN).next().map(text_of).unwrap_or_default();
        match label.as_str() {
            "All Time" => {
                page.insert("all_positive_review_pct".into(), json!(pct));
                page.insert("total_num_reviews".into(), json!(count));
            }
            "Recent" => {
                page.insert("recent_positive_review_pct".into(), json!(pct));
                page.insert("recent_num_reviews".into(), json!(count));
            }
            _ => {}
        }
    }

    if let Some(snippet) = doc.select(&SNIPPET).next() {
        page.insert("description_snippet".into(), json!(text_of(snippet)));
    }

    for row in doc.select(&DEV_ROW) {
        let Some(subtitle) = row.select(&DEV_SUBTITLE).next() else {
            continue;
        };
        let key = match text_of(subtitle).as_str() {
            "Developer:" => "developers",
            "Publisher:" => "publishers",
            _ => continue,
        };
        page.insert(key.into(), json!(distinct_texts(row.select(&LINK))));
    }

    if let Some(date) = doc.select(&RELEASE_DATE).next() {
        page.insert("release_date".into(), json!(text_of(date)));
    }

    page.insert("tags".into(), json!(distinct_texts(doc.select(&APP_TAG))));

    // Bundles and sale packages are ignored: the first block with a usable
    // price wins.
    for block in doc.select(&PURCHASE) {
        let price_el = block
            .select(&ORIGINAL_PRICE)
            .next()
            .or_else(|| block.select(&PRICE).next());
        let Some(price_el) = price_el else {
            continue;
        };
        let text = text_of(price_el);
        if text == "Free To Play" {
            page.insert("price".into(), json!(0.0));
            break;
        }
        if let Some(amount) = PRICE_AMOUNT
            .captures(&text)
            .and_then(|c| c[1].parse::<f64>().ok())
        {
            page.insert("price".into(), json!(amount));
            break;
        }
    }

    page.insert("features".into(), json!(distinct_texts(doc.select(&FEATURE))));

    if let Some(description) = doc.select(&DESCRIPTION).next() {
        page.insert("description".into(), json!(text_of(description)));
    }

    Value::Object(page)
}

/// Scrapes `{store_base}/app/{appid}`.
pub struct StorePageFetcher {
    client: reqwest::Client,
    store_base: String,
}

impl StorePageFetcher {
    pub fn new(client: reqwest::Client, store_base: &str) -> Self {
        Self {
            client,
            store_base: store_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for StorePageFetcher {
    fn dataset(&self) -> &str {
        "details"
    }

    async fn fetch(&self, id: i64) -> Result<FetchOutcome, FetchError> {
        let response = self
            .client
            .get(format!("{}/app/{}", self.store_base, id))
            .send()
            .await
            .map_err(classify_error)?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let body = response.text().await.map_err(classify_error)?;

        let doc = Html::parse_document(&body);
        if is_home_page(&doc) {
            return Ok(FetchOutcome::Absent);
        }
        Ok(FetchOutcome::Found(parse_page(id, &doc)))
    }
}
