//! Static factory-code tables: PR/option codes, engine codes, and
//! facelift production windows.

use crate::types::PartCategory;

pub struct PrCodeInfo {
    pub code: &'static str,
    pub description: &'static str,
    pub category: PartCategory,
    /// Brand the mapping applies to, lowercased.
    pub brand: &'static str,
    /// Directly implied OEM, when the code pins the part down completely.
    pub oem: Option<&'static str>,
}

const PR_CODES: &[PrCodeInfo] = &[
    PrCodeInfo {
        code: "1ZA",
        description: "front brake 288x25mm",
        category: PartCategory::BrakeDisc,
        brand: "volkswagen",
        oem: Some("1K0615301AA"),
    },
    PrCodeInfo {
        code: "1ZD",
        description: "front brake 312x25mm",
        category: PartCategory::BrakeDisc,
        brand: "volkswagen",
        oem: Some("5Q0615301F"),
    },
    PrCodeInfo {
        code: "1ZK",
        description: "front brake 340x30mm performance",
        category: PartCategory::BrakeDisc,
        brand: "volkswagen",
        oem: Some("5Q0615301G"),
    },
    PrCodeInfo {
        code: "1KT",
        description: "rear brake 300x12mm",
        category: PartCategory::BrakeDisc,
        brand: "volkswagen",
        oem: None,
    },
    PrCodeInfo {
        code: "2E4",
        description: "sport suspension",
        category: PartCategory::Suspension,
        brand: "volkswagen",
        oem: None,
    },
];

pub fn lookup_pr_code(brand: &str, code: &str) -> Option<&'static PrCodeInfo> {
    let code = code.to_uppercase();
    PR_CODES
        .iter()
        .find(|info| info.brand == brand && info.code == code)
}

pub struct EngineInfo {
    pub code: &'static str,
    pub description: &'static str,
    pub power_kw: u16,
}

const ENGINE_CODES: &[EngineInfo] = &[
    EngineInfo { code: "CJSA", description: "1.8 TSI", power_kw: 132 },
    EngineInfo { code: "CZCA", description: "1.4 TSI", power_kw: 92 },
    EngineInfo { code: "BKD", description: "2.0 TDI", power_kw: 103 },
    EngineInfo { code: "CRLB", description: "2.0 TDI", power_kw: 110 },
    EngineInfo { code: "N47D20", description: "2.0d", power_kw: 135 },
    EngineInfo { code: "B47D20", description: "2.0d", power_kw: 140 },
    EngineInfo { code: "OM651", description: "2.1 CDI", power_kw: 125 },
];

pub fn lookup_engine_code(code: &str) -> Option<&'static EngineInfo> {
    let code = code.to_uppercase();
    ENGINE_CODES.iter().find(|info| info.code == code)
}

struct FaceliftWindow {
    brand: &'static str,
    model: &'static str,
    year_from: u16,
    year_to: u16,
    tag: &'static str,
}

const FACELIFT_WINDOWS: &[FaceliftWindow] = &[
    FaceliftWindow { brand: "volkswagen", model: "golf", year_from: 2012, year_to: 2016, tag: "pre-facelift" },
    FaceliftWindow { brand: "volkswagen", model: "golf", year_from: 2017, year_to: 2019, tag: "facelift" },
    FaceliftWindow { brand: "volkswagen", model: "passat", year_from: 2014, year_to: 2018, tag: "pre-facelift" },
    FaceliftWindow { brand: "volkswagen", model: "passat", year_from: 2019, year_to: 2022, tag: "facelift" },
    FaceliftWindow { brand: "bmw", model: "3er", year_from: 2012, year_to: 2015, tag: "pre-lci" },
    FaceliftWindow { brand: "bmw", model: "3er", year_from: 2015, year_to: 2018, tag: "lci" },
];

pub fn facelift_era(brand: &str, model: &str, year: u16) -> Option<&'static str> {
    let model = model.to_lowercase();
    FACELIFT_WINDOWS
        .iter()
        .find(|w| w.brand == brand && model.contains(w.model) && year >= w.year_from && year <= w.year_to)
        .map(|w| w.tag)
}
