use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::numeric::extract_number;

/// How derived unit prices are scaled against the offer's numeric quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPriceBasis {
    /// `price * 100 / quantity`, aligned with the per-100 nutrition reference.
    #[default]
    PerHundredUnits,
    /// `price / quantity`.
    PerOfferQuantity,
}

impl UnitPriceBasis {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per_hundred" | "per_hundred_units" | "100" => Some(Self::PerHundredUnits),
            "per_quantity" | "per_offer_quantity" | "1" => Some(Self::PerOfferQuantity),
            _ => None,
        }
    }

    /// `None` when the quantity is zero.
    pub fn unit_price(self, price: f64, quantity: f64) -> Option<f64> {
        if quantity == 0.0 {
            return None;
        }
        Some(match self {
            Self::PerHundredUnits => price * 100.0 / quantity,
            Self::PerOfferQuantity => price / quantity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOffer {
    pub price: Option<f64>,
    /// Raw quantity string, kept verbatim (e.g. `"400g"`).
    pub quantity: Option<String>,
    pub unit_price: Option<f64>,
    pub promotion_price: Option<f64>,
    pub promotion_unit_price: Option<f64>,
}

fn nested_value<'a>(block: &'a Value, outer: &str) -> Option<&'a Value> {
    block.get(outer)?.get("value").filter(|v| !v.is_null())
}

/// Normalize a raw `offer` block.
///
/// An absent, null or empty block yields `None`, so "no offer" stays distinct
/// from an offer whose fields are all absent.
pub fn normalize_offer(block: Option<&Value>, basis: UnitPriceBasis) -> Option<NormalizedOffer> {
    let block = block.filter(|b| b.as_object().is_some_and(|o| !o.is_empty()))?;

    let price = nested_value(block, "price").and_then(Value::as_f64);
    let quantity = match block.get("quantity") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let numeric_quantity = block.get("quantity").and_then(extract_number);

    let explicit_unit_price = block
        .get("price")
        .and_then(|p| p.get("unitPrice"))
        .and_then(|u| u.get("value"))
        .and_then(Value::as_f64);
    let unit_price = explicit_unit_price.or_else(|| match (price, numeric_quantity) {
        (Some(p), Some(q)) => basis.unit_price(p, q),
        _ => None,
    });

    let promotion_price = nested_value(block, "promotionPrice").and_then(Value::as_f64);
    let promotion_unit_price = match (promotion_price, numeric_quantity) {
        (Some(p), Some(q)) => basis.unit_price(p, q),
        _ => None,
    };

    Some(NormalizedOffer {
        price,
        quantity,
        unit_price,
        promotion_price,
        promotion_unit_price,
    })
}
