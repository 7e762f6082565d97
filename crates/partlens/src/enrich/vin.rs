//! VIN decoding: WMI manufacturer lookup, model-year letter, plant and
//! serial split, ISO 3779 check digit.

use std::collections::HashMap;
use std::sync::LazyLock;

static WMI_MAKES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("WVW", "Volkswagen"),
        ("WVG", "Volkswagen"),
        ("WV1", "Volkswagen"),
        ("WAU", "Audi"),
        ("TRU", "Audi"),
        ("WBA", "BMW"),
        ("WBS", "BMW"),
        ("WBY", "BMW"),
        ("WDB", "Mercedes-Benz"),
        ("WDD", "Mercedes-Benz"),
        ("W1K", "Mercedes-Benz"),
        ("WP0", "Porsche"),
        ("TMB", "Skoda"),
        ("VSS", "Seat"),
        ("VF1", "Renault"),
        ("VF3", "Peugeot"),
        ("VF7", "Citroën"),
        ("ZFA", "Fiat"),
        ("WF0", "Ford"),
        ("W0L", "Opel"),
        ("YV1", "Volvo"),
        ("JT", "Toyota"),
        ("SB1", "Toyota"),
        ("JHM", "Honda"),
        ("JN1", "Nissan"),
        ("KMH", "Hyundai"),
        ("KNA", "Kia"),
        ("U5Y", "Kia"),
    ])
});

/// Model-year letter at position 10. Letters cycle every 30 years; the
/// 2010+ window is assumed, digits cover 2001-2009.
fn decode_year(c: char) -> Option<u16> {
    match c {
        'A' => Some(2010),
        'B' => Some(2011),
        'C' => Some(2012),
        'D' => Some(2013),
        'E' => Some(2014),
        'F' => Some(2015),
        'G' => Some(2016),
        'H' => Some(2017),
        'J' => Some(2018),
        'K' => Some(2019),
        'L' => Some(2020),
        'M' => Some(2021),
        'N' => Some(2022),
        'P' => Some(2023),
        'R' => Some(2024),
        'S' => Some(2025),
        'T' => Some(2026),
        '1'..='9' => Some(2000 + c.to_digit(10)? as u16),
        _ => None,
    }
}

/// ISO 3779 character transliteration for the check digit.
fn transliterate(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        'A' | 'J' => Some(1),
        'B' | 'K' | 'S' => Some(2),
        'C' | 'L' | 'T' => Some(3),
        'D' | 'M' | 'U' => Some(4),
        'E' | 'N' | 'V' => Some(5),
        'F' | 'W' => Some(6),
        'G' | 'P' | 'X' => Some(7),
        'H' | 'Y' => Some(8),
        'R' | 'Z' => Some(9),
        _ => None,
    }
}

const CHECK_WEIGHTS: [u32; 17] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone)]
pub struct VinInfo {
    pub make: Option<String>,
    pub year: Option<u16>,
    pub plant: char,
    pub serial: String,
    /// European manufacturers do not always populate the check digit, so a
    /// mismatch degrades trust instead of failing the decode.
    pub check_digit_ok: bool,
}

pub fn decode_vin(vin: &str) -> Result<VinInfo, String> {
    let vin: String = vin.trim().to_uppercase();
    if vin.len() != 17 {
        return Err(format!("VIN must be 17 characters, got {}", vin.len()));
    }
    if vin.chars().any(|c| matches!(c, 'I' | 'O' | 'Q') || !c.is_ascii_alphanumeric()) {
        return Err("VIN contains invalid characters".into());
    }
    let chars: Vec<char> = vin.chars().collect();

    let make = WMI_MAKES
        .get(&vin[..3])
        .or_else(|| WMI_MAKES.get(&vin[..2]))
        .map(|m| m.to_string());
    let year = decode_year(chars[9]);

    let sum: u32 = chars
        .iter()
        .zip(CHECK_WEIGHTS.iter())
        .filter_map(|(c, w)| transliterate(*c).map(|v| v * w))
        .sum();
    let expected = match sum % 11 {
        10 => 'X',
        n => char::from_digit(n, 10).unwrap_or('0'),
    };
    let check_digit_ok = chars[8] == expected;

    Ok(VinInfo {
        make,
        year,
        plant: chars[10],
        serial: vin[11..].to_string(),
        check_digit_ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_wmi_and_year() {
        let info = decode_vin("WVWZZZAUZGW123456").expect("valid vin");
        assert_eq!(info.make.as_deref(), Some("Volkswagen"));
        assert_eq!(info.year, Some(2016));
        assert_eq!(info.serial, "123456");
    }

    #[test]
    fn test_reject_wrong_length_and_letters() {
        assert!(decode_vin("WVWZZZ").is_err());
        assert!(decode_vin("WVWZZZAUZGWI23456").is_err()); // contains I
    }

    #[test]
    fn test_check_digit_validates_known_good_vin() {
        // 1M8GDM9AXKP042788 is the canonical ISO 3779 example.
        let info = decode_vin("1M8GDM9AXKP042788").expect("valid vin");
        assert!(info.check_digit_ok);
    }

    #[test]
    fn test_unknown_wmi_still_decodes_year() {
        let info = decode_vin("XXXZZZAUZGW123456").expect("valid vin");
        assert!(info.make.is_none());
        assert_eq!(info.year, Some(2016));
    }
}
