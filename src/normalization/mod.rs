//! Raw scraped product records into the document and relational shapes.

pub mod category;
pub mod numeric;
pub mod nutrition;
pub mod offer;
pub mod product;
pub mod raw;

pub use category::{resolve_categories, BreadcrumbItem, CategoryLookup, CategoryRecord};
pub use nutrition::{parse_nutrition_table, NormalizedNutrition, NutritionTable};
pub use offer::{normalize_offer, NormalizedOffer, UnitPriceBasis};
pub use product::{
    NormalizedProductDocument, ProductCategoryLink, ProductNormalizer, ProductRow,
    RelationalRecordSet,
};
pub use raw::{NormalizeError, RawProductRecord};
