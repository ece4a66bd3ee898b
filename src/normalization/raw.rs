//! Typed, total accessors over a scraped product record.
//!
//! Every accessor documents its JSON path and what an absent or mistyped
//! value turns into, so normalization never has to poke at raw maps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::category::BreadcrumbItem;
use super::nutrition::{NutritionRow, NutritionTable};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("record root is not a JSON object (found {found})")]
    MalformedRoot { found: &'static str },

    #[error("required field '{0}' missing")]
    MissingField(&'static str),
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Identifier as a string; numeric ids are stringified, blanks rejected.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A raw scraped product: one JSON object.
#[derive(Debug, Clone)]
pub struct RawProductRecord {
    root: Map<String, Value>,
}

impl RawProductRecord {
    pub fn from_value(value: Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(NormalizeError::MalformedRoot {
                found: kind_of(&other),
            }),
        }
    }

    fn path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        let mut cur = self.root.get(*first)?;
        for key in rest {
            cur = cur.get(*key)?;
        }
        Some(cur)
    }

    fn main_information(&self, key: &str) -> Option<String> {
        non_empty_str(self.path(&["productInformation", "mainInformation", key]))
    }

    /// `migrosId`; string or number. Required.
    pub fn migros_id(&self) -> Result<String, NormalizeError> {
        self.root
            .get("migrosId")
            .and_then(id_string)
            .ok_or(NormalizeError::MissingField("migrosId"))
    }

    /// `name`; absent ⇒ `None`.
    pub fn name(&self) -> Option<String> {
        non_empty_str(self.root.get("name"))
    }

    /// `brand`, else `brandLine`; empty strings fall through.
    pub fn brand(&self) -> Option<String> {
        non_empty_str(self.root.get("brand")).or_else(|| non_empty_str(self.root.get("brandLine")))
    }

    pub fn title(&self) -> Option<String> {
        non_empty_str(self.root.get("title"))
    }

    pub fn description(&self) -> Option<String> {
        non_empty_str(self.root.get("description"))
    }

    /// `productInformation.mainInformation.origin`
    pub fn origin(&self) -> Option<String> {
        self.main_information("origin")
    }

    /// `productInformation.mainInformation.ingredients`
    pub fn ingredients(&self) -> Option<String> {
        self.main_information("ingredients")
    }

    /// `gtins`; a bare string counts as one GTIN, absent ⇒ empty.
    pub fn gtins(&self) -> Vec<String> {
        match self.root.get("gtins") {
            Some(Value::Array(items)) => items.iter().filter_map(id_string).collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// `dateAdded`, raw.
    pub fn date_added(&self) -> Option<&str> {
        self.root.get("dateAdded").and_then(Value::as_str)
    }

    /// `productInformation.nutrientsInformation.nutrientsTable`.
    ///
    /// Non-string headers become empty labels so column indexes stay aligned.
    pub fn nutrients_table(&self) -> Option<NutritionTable> {
        let table = self.path(&["productInformation", "nutrientsInformation", "nutrientsTable"])?;
        let headers = table
            .get("headers")?
            .as_array()?
            .iter()
            .map(|h| h.as_str().unwrap_or_default().to_string())
            .collect();
        let rows = table
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| NutritionRow {
                        label: row
                            .get("label")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        values: row
                            .get("values")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(NutritionTable { headers, rows })
    }

    /// `offer`; left raw for the offer normalizer.
    pub fn offer(&self) -> Option<&Value> {
        self.root.get("offer")
    }

    /// `breadcrumb`; non-object entries are skipped.
    pub fn breadcrumb(&self) -> Vec<BreadcrumbItem> {
        let Some(items) = self.root.get("breadcrumb").and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| BreadcrumbItem {
                id: item.get("id").and_then(id_string),
                name: non_empty_str(item.get("name")),
                slugs: item
                    .get("slugs")
                    .and_then(Value::as_array)
                    .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// When the product was scraped, and whether that came from the record or
/// from the capture-time fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapedAt {
    pub at: DateTime<Utc>,
    pub estimated: bool,
}

/// Naive date-time layouts accepted for `dateAdded`, all taken as UTC.
const NAIVE_DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_date_added(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Parse `dateAdded` (RFC 3339, a naive ISO-8601 date-time with `T` or space,
/// or a bare date at midnight; naive values are UTC). Falls back to `captured_at`.
pub fn parse_scraped_at(raw: Option<&str>, captured_at: DateTime<Utc>) -> ScrapedAt {
    let parsed = raw.map(str::trim).filter(|s| !s.is_empty()).and_then(parse_date_added);
    match parsed {
        Some(at) => ScrapedAt { at, estimated: false },
        None => {
            if let Some(raw) = raw {
                tracing::warn!(date_added = raw, "invalid dateAdded; using capture time");
            }
            ScrapedAt {
                at: captured_at,
                estimated: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn rejects_non_object_roots() {
        let err = RawProductRecord::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err, NormalizeError::MalformedRoot { found: "array" });
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn accessors_follow_documented_defaults() {
        let rec = RawProductRecord::from_value(json!({
            "migrosId": 100100300000u64,
            "brand": "",
            "brandLine": "Frey",
            "gtins": "7616500010031",
            "productInformation": {"mainInformation": {"origin": "Switzerland"}}
        }))
        .unwrap();
        assert_eq!(rec.migros_id().unwrap(), "100100300000");
        assert_eq!(rec.brand().as_deref(), Some("Frey"));
        assert_eq!(rec.gtins(), vec!["7616500010031".to_string()]);
        assert_eq!(rec.origin().as_deref(), Some("Switzerland"));
        assert_eq!(rec.ingredients(), None);
        assert_eq!(rec.name(), None);
        assert!(rec.nutrients_table().is_none());
        assert!(rec.breadcrumb().is_empty());
    }

    #[test]
    fn missing_id_is_reported() {
        let rec = RawProductRecord::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(rec.migros_id(), Err(NormalizeError::MissingField("migrosId")));
    }

    #[test]
    fn breadcrumb_and_table_decode() {
        let rec = RawProductRecord::from_value(json!({
            "migrosId": "1",
            "breadcrumb": [{"id": 7, "name": "Food", "slugs": ["food", "fresh"]}, "junk"],
            "productInformation": {"nutrientsInformation": {"nutrientsTable": {
                "headers": ["per 100 g", null],
                "rows": [{"label": "Fat", "values": ["3 g", "1 g"]}]
            }}}
        }))
        .unwrap();
        let crumbs = rec.breadcrumb();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].id.as_deref(), Some("7"));
        assert_eq!(crumbs[0].slug(), Some("fresh"));
        let table = rec.nutrients_table().unwrap();
        assert_eq!(table.headers, vec!["per 100 g".to_string(), String::new()]);
        assert_eq!(table.rows[0].values.len(), 2);
    }

    #[test]
    fn scraped_at_parses_or_falls_back() {
        let captured = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let s = parse_scraped_at(Some("2024-09-26T12:21:23"), captured);
        assert!(!s.estimated);
        assert_eq!(s.at, Utc.with_ymd_and_hms(2024, 9, 26, 12, 21, 23).unwrap());

        let s = parse_scraped_at(Some("2024-09-26T12:21:23+02:00"), captured);
        assert_eq!(s.at, Utc.with_ymd_and_hms(2024, 9, 26, 10, 21, 23).unwrap());

        let s = parse_scraped_at(Some("2024-09-26T12:21:23Z"), captured);
        assert!(!s.estimated);

        let s = parse_scraped_at(Some("yesterday"), captured);
        assert!(s.estimated);
        assert_eq!(s.at, captured);

        assert!(parse_scraped_at(None, captured).estimated);
    }

    #[test]
    fn scraped_at_accepts_space_separated_and_date_only() {
        let captured = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let s = parse_scraped_at(Some("2024-09-26 12:21:23"), captured);
        assert!(!s.estimated);
        assert_eq!(s.at, Utc.with_ymd_and_hms(2024, 9, 26, 12, 21, 23).unwrap());

        let s = parse_scraped_at(Some("2024-09-26 12:21:23.250"), captured);
        assert!(!s.estimated);

        let s = parse_scraped_at(Some("2024-09-26"), captured);
        assert!(!s.estimated);
        assert_eq!(s.at, Utc.with_ymd_and_hms(2024, 9, 26, 0, 0, 0).unwrap());

        assert!(parse_scraped_at(Some("2024-13-40"), captured).estimated);
    }
}
