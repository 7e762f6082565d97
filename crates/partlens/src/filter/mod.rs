pub mod aftermarket;
pub mod brand_schema;
pub mod part_match;

pub use aftermarket::{classify_aftermarket, AftermarketFilter, AftermarketSplit, ReverseCascade};
pub use brand_schema::{generically_plausible, schema_score, BrandSchemaFilter};
pub use part_match::PartMatchFilter;
