//! Natural-key to surrogate-id resolution.
//!
//! A [`NaturalKeyResolver`] lives for exactly one normalization run. Each
//! dimension gets its own id space starting at 1; ids are handed out in
//! first-seen order and never reused or renumbered within the run.
//!
//! Keys are trimmed before lookup. A key that is empty after trimming, or
//! that appears in the dimension's [`denylist`](Dimension::denylist),
//! resolves to `None` and leaves no trace in the tables.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Dimension, DimensionTables, DimensionValue};

#[derive(Debug, Default)]
struct DimensionMap {
    ids: HashMap<String, i64>,
    values: Vec<DimensionValue>,
}

impl DimensionMap {
    fn resolve(&mut self, key: &str) -> i64 {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        let id = self.values.len() as i64 + 1;
        self.ids.insert(key.to_string(), id);
        self.values.push(DimensionValue {
            id,
            key: key.to_string(),
        });
        id
    }
}

/// Per-run natural-key resolver for every [`Dimension`].
#[derive(Debug, Default)]
pub struct NaturalKeyResolver {
    maps: BTreeMap<Dimension, DimensionMap>,
}

impl NaturalKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `natural_key` in `dimension`, allocating the next id on first
    /// sight.
    pub fn resolve(&mut self, dimension: Dimension, natural_key: &str) -> Option<i64> {
        let key = natural_key.trim();
        if key.is_empty() || dimension.denylist().contains(&key) {
            return None;
        }
        Some(self.maps.entry(dimension).or_default().resolve(key))
    }

    /// Resolve an optional key; `None` in means `None` out.
    pub fn resolve_opt(&mut self, dimension: Dimension, natural_key: Option<&str>) -> Option<i64> {
        natural_key.and_then(|k| self.resolve(dimension, k))
    }

    /// Resolve every key, dropping filtered keys and repeated ids while
    /// keeping first-seen order.
    pub fn resolve_all<'k, I>(&mut self, dimension: Dimension, keys: I) -> Vec<i64>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let mut ids = Vec::new();
        for key in keys {
            if let Some(id) = self.resolve(dimension, key) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Consume the resolver, yielding every allocated enumeration row.
    pub fn into_tables(self) -> DimensionTables {
        DimensionTables::new(
            self.maps
                .into_iter()
                .map(|(dim, map)| (dim, map.values))
                .collect(),
        )
    }
}

#[cfg(test)]
impl NaturalKeyResolver {
    /// Look up an id without allocating.
    fn get(&self, dimension: Dimension, natural_key: &str) -> Option<i64> {
        self.maps
            .get(&dimension)
            .and_then(|m| m.ids.get(natural_key.trim()).copied())
    }

    /// Number of entries allocated so far in `dimension`.
    fn len(&self, dimension: Dimension) -> usize {
        self.maps.get(&dimension).map_or(0, |m| m.values.len())
    }

    fn is_empty(&self) -> bool {
        self.maps.values().all(|m| m.values.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_id() {
        let mut r = NaturalKeyResolver::new();
        let a = r.resolve(Dimension::Company, "Valve");
        let b = r.resolve(Dimension::Company, "  Valve ");
        assert_eq!(a, Some(1));
        assert_eq!(a, b);
        assert_eq!(r.len(Dimension::Company), 1);
    }

    #[test]
    fn ids_are_dense_per_dimension() {
        let mut r = NaturalKeyResolver::new();
        for key in ["a", "b", "a", "c", "b", "d"] {
            r.resolve(Dimension::Feature, key);
        }
        r.resolve(Dimension::Author, "x");

        let tables = r.into_tables();
        let ids: Vec<i64> = tables
            .values(Dimension::Feature)
            .iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(tables.values(Dimension::Author)[0].id, 1);
    }

    #[test]
    fn keys_are_case_sensitive() {
        let mut r = NaturalKeyResolver::new();
        assert_ne!(
            r.resolve(Dimension::GameTag, "RPG"),
            r.resolve(Dimension::GameTag, "rpg")
        );
    }

    #[test]
    fn empty_key_is_no_value() {
        let mut r = NaturalKeyResolver::new();
        assert_eq!(r.resolve(Dimension::Author, "   "), None);
        assert_eq!(r.resolve_opt(Dimension::Feedname, None), None);
        assert!(r.is_empty());
    }

    #[test]
    fn denylisted_tag_never_allocates() {
        let mut r = NaturalKeyResolver::new();
        assert_eq!(r.resolve(Dimension::GameTag, " + "), None);
        assert_eq!(r.len(Dimension::GameTag), 0);
        // Only game tags carry the placeholder.
        assert_eq!(r.resolve(Dimension::NewsitemTag, "+"), Some(1));
    }

    #[test]
    fn resolve_all_dedups_in_order() {
        let mut r = NaturalKeyResolver::new();
        let ids = r.resolve_all(Dimension::Company, ["Acme", "Beta", "Acme ", "", "Beta"]);
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(r.get(Dimension::Company, "Beta"), Some(2));
    }
}
