use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::numeric::extract_number;

/// Nutrition table as scraped: `values[i]` of every row belongs to `headers[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutritionTable {
    pub headers: Vec<String>,
    pub rows: Vec<NutritionRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutritionRow {
    pub label: String,
    pub values: Vec<Value>,
}

/// Nutrition values for one reference column. Numeric fields are `None` when
/// the source value could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedNutrition {
    pub unit: String,
    pub quantity: f64,
    #[serde(rename = "kJ")]
    pub kj: Option<f64>,
    pub kcal: Option<f64>,
    pub fat: Option<f64>,
    pub saturates: Option<f64>,
    pub carbohydrate: Option<f64>,
    pub sugars: Option<f64>,
    pub fibre: Option<f64>,
    pub protein: Option<f64>,
    pub salt: Option<f64>,
}

impl NormalizedNutrition {
    fn empty(unit: String, quantity: f64) -> Self {
        Self {
            unit,
            quantity,
            kj: None,
            kcal: None,
            fat: None,
            saturates: None,
            carbohydrate: None,
            sugars: None,
            fibre: None,
            protein: None,
            salt: None,
        }
    }

    fn slot(&mut self, field: NutrientField) -> &mut Option<f64> {
        match field {
            NutrientField::Fat => &mut self.fat,
            NutrientField::Saturates => &mut self.saturates,
            NutrientField::Carbohydrate => &mut self.carbohydrate,
            NutrientField::Sugars => &mut self.sugars,
            NutrientField::Fibre => &mut self.fibre,
            NutrientField::Protein => &mut self.protein,
            NutrientField::Salt => &mut self.salt,
        }
    }
}

/// Single-valued nutrient targets (energy is handled separately since one
/// cell carries both kJ and kcal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutrientField {
    Fat,
    Saturates,
    Carbohydrate,
    Sugars,
    Fibre,
    Protein,
    Salt,
}

/// `token` in the lowercased label selects `field`, unless `unless` is also present.
#[derive(Debug, Clone, Copy)]
pub struct NutrientRule {
    pub token: &'static str,
    pub field: NutrientField,
    pub unless: Option<&'static str>,
}

impl NutrientRule {
    const fn new(token: &'static str, field: NutrientField, unless: Option<&'static str>) -> Self {
        Self { token, field, unless }
    }

    fn matches(&self, label: &str) -> bool {
        label.contains(self.token) && !self.unless.is_some_and(|ex| label.contains(ex))
    }
}

/// Evaluated in order; the first matching rule wins.
pub const NUTRIENT_RULES: [NutrientRule; 7] = [
    NutrientRule::new("fat", NutrientField::Fat, Some("saturates")),
    NutrientRule::new("saturates", NutrientField::Saturates, None),
    NutrientRule::new("carbohydrate", NutrientField::Carbohydrate, Some("sugars")),
    NutrientRule::new("sugars", NutrientField::Sugars, None),
    NutrientRule::new("fibre", NutrientField::Fibre, None),
    NutrientRule::new("protein", NutrientField::Protein, None),
    NutrientRule::new("salt", NutrientField::Salt, None),
];

/// Map a row label to its nutrient field. Unknown labels yield `None`.
pub fn match_nutrient(label: &str) -> Option<NutrientField> {
    let label = label.to_lowercase();
    NUTRIENT_RULES
        .iter()
        .find(|rule| rule.matches(&label))
        .map(|rule| rule.field)
}

/// The column chosen as authoritative for a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSelection {
    pub index: usize,
    pub unit: String,
    pub quantity: f64,
}

/// Column heuristics in priority order. Each rule is tried against every
/// header before the next rule is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRule {
    Per100Grams,
    Per100Millilitres,
    Serving,
}

pub const COLUMN_RULES: [ColumnRule; 3] = [
    ColumnRule::Per100Grams,
    ColumnRule::Per100Millilitres,
    ColumnRule::Serving,
];

fn serving_size_re() -> &'static Regex {
    static SERVING_SIZE_RE: OnceLock<Regex> = OnceLock::new();
    SERVING_SIZE_RE.get_or_init(|| {
        Regex::new(r"\((\d+(?:\.\d+)?)\s*(g|ml)\)").expect("valid serving size regex")
    })
}

/// A decimal that may carry thousands groups separated by a space, a
/// no-break space or an apostrophe (`1 046`, `1'046`).
const ENERGY_NUMBER: &str = r"(\d{1,3}(?:[ \x{00A0}\x{202F}']\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?)";

fn energy_re() -> &'static Regex {
    static ENERGY_RE: OnceLock<Regex> = OnceLock::new();
    ENERGY_RE.get_or_init(|| {
        Regex::new(&format!(r"(?i){ENERGY_NUMBER}\s*kJ.*?\(?\s*{ENERGY_NUMBER}\s*kcal"))
            .expect("valid energy regex")
    })
}

fn energy_number(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00A0}' | '\u{202F}' | '\''))
        .collect();
    digits.replace(',', ".").parse().ok()
}

impl ColumnRule {
    fn apply(self, index: usize, header: &str) -> Option<ColumnSelection> {
        let select = |unit: &str, quantity: f64| ColumnSelection {
            index,
            unit: unit.to_string(),
            quantity,
        };
        match self {
            ColumnRule::Per100Grams => header.contains("100 g").then(|| select("g", 100.0)),
            ColumnRule::Per100Millilitres => (header.contains("100ml")
                || header.contains("100 ml"))
            .then(|| select("ml", 100.0)),
            ColumnRule::Serving => {
                if !header.contains("Becher") && !header.to_lowercase().contains("serving") {
                    return None;
                }
                let sized = serving_size_re().captures(header).and_then(|caps| {
                    let quantity = caps.get(1)?.as_str().parse::<f64>().ok()?;
                    Some(select(caps.get(2)?.as_str(), quantity))
                });
                Some(sized.unwrap_or_else(|| select("serving", 1.0)))
            }
        }
    }
}

/// Pick the authoritative column, or `None` when no header qualifies.
pub fn select_column(headers: &[String]) -> Option<ColumnSelection> {
    COLUMN_RULES.iter().find_map(|rule| {
        headers
            .iter()
            .enumerate()
            .find_map(|(index, header)| rule.apply(index, header))
    })
}

/// Parse a `"<X> kJ ... (<Y> kcal)"` cell into `(kJ, kcal)`.
pub fn parse_energy(raw: &str) -> Option<(f64, f64)> {
    let caps = energy_re().captures(raw)?;
    let kj = energy_number(caps.get(1)?.as_str())?;
    let kcal = energy_number(caps.get(2)?.as_str())?;
    Some((kj, kcal))
}

/// Normalize a nutrition table against its authoritative column.
pub fn parse_nutrition_table(table: &NutritionTable) -> Option<NormalizedNutrition> {
    if table.headers.is_empty() {
        debug!("nutrition table has no headers");
        return None;
    }
    let Some(column) = select_column(&table.headers) else {
        warn!(headers = ?table.headers, "no per-100 or serving column in nutrition table");
        return None;
    };

    let mut out = NormalizedNutrition::empty(column.unit, column.quantity);
    for row in &table.rows {
        let Some(value) = row.values.get(column.index) else {
            continue;
        };
        let label = row.label.to_lowercase();
        if label.contains("energy") {
            match value.as_str().and_then(parse_energy) {
                Some((kj, kcal)) => {
                    out.kj = Some(kj);
                    out.kcal = Some(kcal);
                }
                None => warn!(value = %value, "energy values not found"),
            }
            continue;
        }
        let Some(field) = match_nutrient(&label) else {
            continue;
        };
        if let Some(n) = extract_number(value) {
            *out.slot(field) = Some(n);
        }
    }
    Some(out)
}
