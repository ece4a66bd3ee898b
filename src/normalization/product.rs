use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug_span;

use super::category::{resolve_categories, CategoryLookup, CategoryRecord};
use super::nutrition::{parse_nutrition_table, NormalizedNutrition};
use super::offer::{normalize_offer, NormalizedOffer, UnitPriceBasis};
use super::raw::{parse_scraped_at, NormalizeError, RawProductRecord, ScrapedAt};

/// Document-model output: one self-contained product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedProductDocument {
    #[serde(rename = "migrosId")]
    pub migros_id: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub origin: Option<String>,
    pub ingredients: Option<String>,
    pub gtins: Vec<String>,
    pub scraped_at: DateTime<Utc>,
    pub scraped_at_estimated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NormalizedNutrition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<NormalizedOffer>,
    pub categories: Vec<CategoryRecord>,
}

/// Row for the relational `product` table. Nutrition and offer rows are
/// linked by surrogate keys assigned at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub migros_id: String,
    pub scraped_at: DateTime<Utc>,
    pub scraped_at_estimated: bool,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub origin: Option<String>,
    pub ingredients: Option<String>,
    /// Comma-joined GTINs.
    pub gtins: Option<String>,
}

/// `(product_id, scraped_at, category_id)`: a re-scrape may carry its own category set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCategoryLink {
    pub product_id: String,
    pub scraped_at: DateTime<Utc>,
    pub category_id: String,
}

/// Relational-model output for one raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalRecordSet {
    pub product: ProductRow,
    pub nutrition: Option<NormalizedNutrition>,
    pub offer: Option<NormalizedOffer>,
    pub categories: Vec<CategoryRecord>,
}

impl RelationalRecordSet {
    pub fn category_links(&self) -> Vec<ProductCategoryLink> {
        self.categories
            .iter()
            .map(|c| ProductCategoryLink {
                product_id: self.product.migros_id.clone(),
                scraped_at: self.product.scraped_at,
                category_id: c.id.clone(),
            })
            .collect()
    }
}

struct Parts {
    migros_id: String,
    scraped_at: ScrapedAt,
    record: RawProductRecord,
    nutrition: Option<NormalizedNutrition>,
    offer: Option<NormalizedOffer>,
    categories: Vec<CategoryRecord>,
}

/// Normalizes raw records into either representation.
///
/// `captured_at` stands in for a missing or unparsable `dateAdded`; it is
/// fixed at construction so the same input always yields the same output.
#[derive(Debug, Clone)]
pub struct ProductNormalizer<'a> {
    lookup: &'a CategoryLookup,
    basis: UnitPriceBasis,
    captured_at: DateTime<Utc>,
}

impl<'a> ProductNormalizer<'a> {
    pub fn new(lookup: &'a CategoryLookup, basis: UnitPriceBasis, captured_at: DateTime<Utc>) -> Self {
        Self {
            lookup,
            basis,
            captured_at,
        }
    }

    fn parts(&self, raw: Value) -> Result<Parts, NormalizeError> {
        let record = RawProductRecord::from_value(raw)?;
        let migros_id = record.migros_id()?;
        let span = debug_span!("normalize", migros_id = %migros_id);
        let _enter = span.enter();

        let scraped_at = parse_scraped_at(record.date_added(), self.captured_at);
        let nutrition = record.nutrients_table().and_then(|t| parse_nutrition_table(&t));
        let offer = normalize_offer(record.offer(), self.basis);
        let categories = resolve_categories(&record.breadcrumb(), self.lookup);
        Ok(Parts {
            migros_id,
            scraped_at,
            record,
            nutrition,
            offer,
            categories,
        })
    }

    pub fn to_document(&self, raw: Value) -> Result<NormalizedProductDocument, NormalizeError> {
        let Parts {
            migros_id,
            scraped_at,
            record,
            nutrition,
            offer,
            categories,
        } = self.parts(raw)?;
        Ok(NormalizedProductDocument {
            migros_id,
            name: record.name(),
            brand: record.brand(),
            title: record.title(),
            description: record.description(),
            origin: record.origin(),
            ingredients: record.ingredients(),
            gtins: record.gtins(),
            scraped_at: scraped_at.at,
            scraped_at_estimated: scraped_at.estimated,
            nutrition,
            offer,
            categories,
        })
    }

    pub fn to_relational(&self, raw: Value) -> Result<RelationalRecordSet, NormalizeError> {
        let Parts {
            migros_id,
            scraped_at,
            record,
            nutrition,
            offer,
            categories,
        } = self.parts(raw)?;
        let gtins = record.gtins();
        Ok(RelationalRecordSet {
            product: ProductRow {
                migros_id,
                scraped_at: scraped_at.at,
                scraped_at_estimated: scraped_at.estimated,
                name: record.name(),
                brand: record.brand(),
                title: record.title(),
                description: record.description(),
                origin: record.origin(),
                ingredients: record.ingredients(),
                gtins: (!gtins.is_empty()).then(|| gtins.join(",")),
            },
            nutrition,
            offer,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "migrosId": "100100300000",
            "name": "Chocolate bars",
            "brand": "Frey",
            "title": "Frey · Chocolate bars · Milk chocolate with hazelnuts",
            "gtins": ["7616500010031", "7616500010048"],
            "productInformation": {
                "mainInformation": {"origin": "Switzerland", "ingredients": "sugar, hazelnuts"},
                "nutrientsInformation": {"nutrientsTable": {
                    "headers": ["per 100 g"],
                    "rows": [
                        {"label": "Energy", "values": ["2360 kJ (567 kcal)"]},
                        {"label": "Protein", "values": ["7.6 g"]}
                    ]
                }}
            },
            "offer": {"price": {"value": 7.2}, "quantity": "400g", "promotionPrice": {"value": 5.8}},
            "breadcrumb": [
                {"id": "1", "name": "Food", "slugs": ["food"]},
                {"id": "2", "name": "Snacks", "slugs": ["food", "snacks"]},
                {"id": "1", "name": "Food", "slugs": ["food"]}
            ]
        })
    }

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn document_embeds_everything() {
        let lookup = CategoryLookup::default();
        let normalizer = ProductNormalizer::new(&lookup, UnitPriceBasis::default(), captured());
        let doc = normalizer.to_document(sample()).expect("document");

        assert_eq!(doc.migros_id, "100100300000");
        assert_eq!(doc.gtins.len(), 2);
        assert!(doc.scraped_at_estimated);
        assert_eq!(doc.scraped_at, captured());
        let nutrition = doc.nutrition.as_ref().expect("nutrition");
        assert_eq!(nutrition.kj, Some(2360.0));
        assert_eq!(nutrition.protein, Some(7.6));
        assert_eq!(doc.offer.as_ref().and_then(|o| o.price), Some(7.2));
        assert_eq!(doc.categories.len(), 2);

        let body = serde_json::to_value(&doc).unwrap();
        assert_eq!(body["migrosId"], "100100300000");
        assert_eq!(body["nutrition"]["kJ"], 2360.0);
        assert_eq!(body["categories"][1]["name"], "Snacks");
    }

    #[test]
    fn normalizing_twice_is_byte_identical() {
        let lookup = CategoryLookup::from_documents(&[json!({"id": "2", "name": "Snacks & Sweets", "slug": "snacks"})]);
        let normalizer = ProductNormalizer::new(&lookup, UnitPriceBasis::default(), captured());
        let a = serde_json::to_vec(&normalizer.to_document(sample()).unwrap()).unwrap();
        let b = serde_json::to_vec(&normalizer.to_document(sample()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn relational_record_set_links_categories_by_scrape() {
        let lookup = CategoryLookup::default();
        let normalizer = ProductNormalizer::new(&lookup, UnitPriceBasis::default(), captured());
        let mut raw = sample();
        raw["dateAdded"] = json!("2024-09-26T12:21:23");
        let set = normalizer.to_relational(raw).expect("record set");

        assert_eq!(set.product.gtins.as_deref(), Some("7616500010031,7616500010048"));
        assert!(!set.product.scraped_at_estimated);
        let links = set.category_links();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.product_id == "100100300000"
            && l.scraped_at == Utc.with_ymd_and_hms(2024, 9, 26, 12, 21, 23).unwrap()));
        assert_eq!(links[1].category_id, "2");
    }

    #[test]
    fn malformed_records_are_errors() {
        let lookup = CategoryLookup::default();
        let normalizer = ProductNormalizer::new(&lookup, UnitPriceBasis::default(), captured());
        assert!(matches!(
            normalizer.to_document(json!("oops")),
            Err(NormalizeError::MalformedRoot { .. })
        ));
        assert!(matches!(
            normalizer.to_relational(json!({"name": "no id"})),
            Err(NormalizeError::MissingField("migrosId"))
        ));
    }
}
