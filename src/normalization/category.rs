use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::raw::id_string;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// One breadcrumb step on a raw product, broadest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreadcrumbItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub slugs: Vec<String>,
}

impl BreadcrumbItem {
    /// The most specific slug of the item.
    pub fn slug(&self) -> Option<&str> {
        self.slugs.last().map(String::as_str)
    }
}

/// Canonical categories from the category dataset, keyed by slug.
#[derive(Debug, Clone, Default)]
pub struct CategoryLookup {
    by_slug: IndexMap<String, CategoryRecord>,
}

impl CategoryLookup {
    pub fn from_documents(documents: &[Value]) -> Self {
        let mut by_slug = IndexMap::new();
        for doc in documents {
            let Some(slug) = doc.get("slug").and_then(Value::as_str).filter(|s| !s.is_empty())
            else {
                continue;
            };
            let Some(id) = doc.get("id").and_then(id_string) else {
                debug!(slug, "category document without id");
                continue;
            };
            by_slug.insert(
                slug.to_string(),
                CategoryRecord {
                    id,
                    name: doc.get("name").and_then(Value::as_str).map(str::to_string),
                    slug: Some(slug.to_string()),
                },
            );
        }
        Self { by_slug }
    }

    pub fn get(&self, slug: &str) -> Option<&CategoryRecord> {
        self.by_slug.get(slug)
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }
}

/// Turn a breadcrumb into an ordered category list with unique ids.
///
/// Known slugs resolve to the canonical record; unknown ones keep the
/// breadcrumb's own id/name/slug. Items without an id are dropped.
pub fn resolve_categories(breadcrumb: &[BreadcrumbItem], lookup: &CategoryLookup) -> Vec<CategoryRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(breadcrumb.len());
    for item in breadcrumb {
        let Some(id) = item.id.as_deref() else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }
        let record = match item.slug().and_then(|slug| lookup.get(slug)) {
            Some(canonical) => canonical.clone(),
            None => CategoryRecord {
                id: id.to_string(),
                name: item.name.clone(),
                slug: item.slug().map(str::to_string),
            },
        };
        // a canonical id may already have been emitted under another breadcrumb id
        if record.id != id && !seen.insert(record.id.clone()) {
            continue;
        }
        out.push(record);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crumb(id: &str, name: &str, slugs: &[&str]) -> BreadcrumbItem {
        BreadcrumbItem {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            slugs: slugs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn duplicate_ids_keep_first_position() {
        let crumbs = vec![
            crumb("1", "Food", &["food"]),
            crumb("2", "Snacks", &["food", "snacks"]),
            crumb("1", "Food again", &["food-again"]),
            crumb("3", "Chocolate", &["food", "snacks", "chocolate"]),
        ];
        let cats = resolve_categories(&crumbs, &CategoryLookup::default());
        let ids: Vec<&str> = cats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(cats[0].name.as_deref(), Some("Food"));
        assert_eq!(cats[2].slug.as_deref(), Some("chocolate"));
    }

    #[test]
    fn lookup_enriches_known_slugs() {
        let lookup = CategoryLookup::from_documents(&[
            json!({"id": "7494731", "name": "Chocolate bars", "slug": "chocolate", "path": "/a/b"}),
            json!({"id": 99, "name": "No slug"}),
        ]);
        assert_eq!(lookup.len(), 1);

        let cats = resolve_categories(
            &[crumb("3", "Choc", &["food", "chocolate"]), crumb("4", "Other", &[])],
            &lookup,
        );
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].id, "7494731");
        assert_eq!(cats[0].name.as_deref(), Some("Chocolate bars"));
        assert_eq!(cats[1].id, "4");
        assert_eq!(cats[1].slug, None);
    }

    #[test]
    fn canonical_ids_stay_unique() {
        let lookup = CategoryLookup::from_documents(&[
            json!({"id": "10", "name": "Dairy", "slug": "dairy"}),
        ]);
        let cats = resolve_categories(
            &[crumb("1", "Milk", &["dairy"]), crumb("2", "Milk products", &["dairy"])],
            &lookup,
        );
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].id, "10");
    }

    #[test]
    fn items_without_id_are_skipped() {
        let crumbs = vec![BreadcrumbItem {
            id: None,
            name: Some("Orphan".into()),
            slugs: vec!["orphan".into()],
        }];
        assert!(resolve_categories(&crumbs, &CategoryLookup::default()).is_empty());
    }
}
