//! Read-only views over harvested payloads.
//!
//! Payloads arrive as untyped JSON exactly as the harvest loop persisted
//! them. The views here borrow the payload and pull fields out leniently:
//! a malformed scalar becomes `None` instead of failing the record. The
//! payload itself is never modified.

use serde_json::Value;

/// Borrowed view of one scraped store page.
#[derive(Debug, Clone, Copy)]
pub struct RawGame<'a> {
    value: &'a Value,
}

impl<'a> RawGame<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn appid(&self) -> Option<i64> {
        int_field(self.value, "appid")
    }

    pub fn developers(&self) -> Vec<&'a str> {
        str_list(self.value, "developers")
    }

    pub fn publishers(&self) -> Vec<&'a str> {
        str_list(self.value, "publishers")
    }

    pub fn tags(&self) -> Vec<&'a str> {
        str_list(self.value, "tags")
    }

    pub fn features(&self) -> Vec<&'a str> {
        str_list(self.value, "features")
    }

    pub fn release_date(&self) -> Option<&'a str> {
        str_field(self.value, "release_date")
    }

    pub fn price(&self) -> Option<f64> {
        float_field(self.value, "price")
    }

    pub fn description(&self) -> Option<String> {
        str_field(self.value, "description").map(str::to_string)
    }

    pub fn description_snippet(&self) -> Option<String> {
        str_field(self.value, "description_snippet").map(str::to_string)
    }

    pub fn all_positive_review_pct(&self) -> Option<i64> {
        int_field(self.value, "all_positive_review_pct")
    }

    pub fn total_num_reviews(&self) -> Option<i64> {
        int_field(self.value, "total_num_reviews")
    }

    pub fn recent_positive_review_pct(&self) -> Option<i64> {
        int_field(self.value, "recent_positive_review_pct")
    }

    pub fn recent_num_reviews(&self) -> Option<i64> {
        int_field(self.value, "recent_num_reviews")
    }
}

/// Borrowed view of one item from `GetNewsForApp`.
#[derive(Debug, Clone, Copy)]
pub struct RawNewsItem<'a> {
    value: &'a Value,
}

impl<'a> RawNewsItem<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// The API sends `gid` as a string holding an integer.
    pub fn gid(&self) -> Option<i64> {
        int_field(self.value, "gid")
    }

    pub fn appid(&self) -> Option<i64> {
        int_field(self.value, "appid")
    }

    pub fn title(&self) -> &'a str {
        str_field(self.value, "title").unwrap_or_default()
    }

    pub fn url(&self) -> &'a str {
        str_field(self.value, "url").unwrap_or_default()
    }

    pub fn is_external_url(&self) -> bool {
        self.value
            .get("is_external_url")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn author(&self) -> Option<&'a str> {
        str_field(self.value, "author")
    }

    pub fn contents(&self) -> &'a str {
        str_field(self.value, "contents").unwrap_or_default()
    }

    pub fn feedlabel(&self) -> Option<&'a str> {
        str_field(self.value, "feedlabel")
    }

    pub fn feedname(&self) -> Option<&'a str> {
        str_field(self.value, "feedname")
    }

    pub fn feed_type(&self) -> i64 {
        int_field(self.value, "feed_type").unwrap_or(0)
    }

    /// Unix epoch seconds.
    pub fn date(&self) -> Option<i64> {
        int_field(self.value, "date")
    }

    pub fn tags(&self) -> Vec<&'a str> {
        str_list(self.value, "tags")
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn float_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_list<'a>(value: &'a Value, key: &str) -> Vec<&'a str> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gid_accepts_string_and_number() {
        let a = json!({ "gid": "5083512512391254437" });
        let b = json!({ "gid": 42 });
        assert_eq!(RawNewsItem::new(&a).gid(), Some(5083512512391254437));
        assert_eq!(RawNewsItem::new(&b).gid(), Some(42));
    }

    #[test]
    fn malformed_numbers_become_none() {
        let v = json!({
            "appid": 10,
            "price": "free",
            "total_num_reviews": "1,024",
            "recent_num_reviews": [1],
        });
        let game = RawGame::new(&v);
        assert_eq!(game.appid(), Some(10));
        assert_eq!(game.price(), None);
        assert_eq!(game.total_num_reviews(), Some(1024));
        assert_eq!(game.recent_num_reviews(), None);
    }

    #[test]
    fn lists_skip_non_strings() {
        let v = json!({ "tags": ["RPG", 3, null, "Indie"] });
        assert_eq!(RawGame::new(&v).tags(), vec!["RPG", "Indie"]);
        assert!(RawGame::new(&v).features().is_empty());
    }
}
