//! Built-in cross-reference table for very common parts.
//!
//! A few dozen rows covering the highest-volume requests keeps the pipeline
//! useful offline and in degraded mode. Entries were validated manually.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AdapterError;
use crate::sources::{SourceAdapter, SourceKind};
use crate::types::{meta, Candidate, PartCategory, ResolutionRequest};

struct StaticRow {
    brand: &'static str,
    model: &'static str,
    category: PartCategory,
    year_from: u16,
    year_to: u16,
    oem: &'static str,
    note: &'static str,
}

const STATIC_ROWS: &[StaticRow] = &[
    StaticRow {
        brand: "volkswagen",
        model: "golf",
        category: PartCategory::BrakeDisc,
        year_from: 2012,
        year_to: 2019,
        oem: "5Q0615301F",
        note: "312mm front, most common fitment",
    },
    StaticRow {
        brand: "volkswagen",
        model: "golf",
        category: PartCategory::BrakePad,
        year_from: 2012,
        year_to: 2019,
        oem: "5Q0698151D",
        note: "front axle set",
    },
    StaticRow {
        brand: "volkswagen",
        model: "passat",
        category: PartCategory::BrakeDisc,
        year_from: 2014,
        year_to: 2021,
        oem: "5Q0615301G",
        note: "340mm front",
    },
    StaticRow {
        brand: "audi",
        model: "a3",
        category: PartCategory::BrakeDisc,
        year_from: 2012,
        year_to: 2019,
        oem: "5Q0615301F",
        note: "shared MQB front disc",
    },
    StaticRow {
        brand: "bmw",
        model: "3er",
        category: PartCategory::Filter,
        year_from: 2012,
        year_to: 2018,
        oem: "11428507683",
        note: "oil filter element B47/B57",
    },
    StaticRow {
        brand: "mercedes-benz",
        model: "c-klasse",
        category: PartCategory::BrakeDisc,
        year_from: 2014,
        year_to: 2021,
        oem: "A0004212512",
        note: "front, W205",
    },
];

pub struct StaticTableSource;

impl StaticTableSource {
    pub const NAME: &'static str = "static-table";
}

#[async_trait]
impl SourceAdapter for StaticTableSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Static
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(8)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let brand = request.vehicle.brand_key();
        let model = request.vehicle.model.to_lowercase();
        let category = request.part.effective_category();
        let year = request.vehicle.year;

        Ok(STATIC_ROWS
            .iter()
            .filter(|row| {
                row.brand == brand
                    && model.contains(row.model)
                    && row.category == category
                    && year
                        .map(|y| y >= row.year_from && y <= row.year_to)
                        .unwrap_or(true)
            })
            .map(|row| {
                Candidate::new(row.oem, Self::NAME, 0.82)
                    .with_brand(request.vehicle.make.clone())
                    .with_priority(8)
                    .with_meta(meta::DESCRIPTION, row.note)
                    .with_meta(meta::VARIANT_NOTE, row.note)
            })
            .collect())
    }
}
