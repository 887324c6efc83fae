//! EU VAT rates and computation.
//!
//! VAT applies to consumer purchases shipped to EU member states. Business
//! buyers (reverse charge) and non-EU countries pay none. Rates are the
//! standard rates as of 2024.

/// Look up the standard VAT rate for an EU member state.
///
/// Returns `None` for countries outside the EU.
#[must_use]
pub fn vat_rate(country: &str) -> Option<f64> {
    let rate = match country {
        "AT" => 0.20, // Austria
        "BE" => 0.21, // Belgium
        "BG" => 0.20, // Bulgaria
        "HR" => 0.25, // Croatia
        "CY" => 0.19, // Cyprus
        "CZ" => 0.21, // Czech Republic
        "DK" => 0.25, // Denmark
        "EE" => 0.22, // Estonia
        "FI" => 0.24, // Finland
        "FR" => 0.20, // France
        "DE" => 0.19, // Germany
        "GR" => 0.24, // Greece
        "HU" => 0.27, // Hungary
        "IE" => 0.23, // Ireland
        "IT" => 0.22, // Italy
        "LV" => 0.21, // Latvia
        "LT" => 0.21, // Lithuania
        "LU" => 0.17, // Luxembourg
        "MT" => 0.18, // Malta
        "NL" => 0.21, // Netherlands
        "PL" => 0.23, // Poland
        "PT" => 0.23, // Portugal
        "RO" => 0.19, // Romania
        "SK" => 0.20, // Slovakia
        "SI" => 0.22, // Slovenia
        "ES" => 0.21, // Spain
        "SE" => 0.25, // Sweden
        _ => return None,
    };
    Some(rate)
}

/// Whether `country` is an EU member state.
#[must_use]
pub fn is_eu_country(country: &str) -> bool {
    vat_rate(country).is_some()
}

/// Compute the VAT amount in minor currency units.
///
/// Business customers and non-EU countries pay no VAT. The result is
/// rounded to the nearest cent.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn calculate_vat_cents(amount_cents: i64, country: &str, is_business: bool) -> i64 {
    if is_business {
        return 0;
    }
    let Some(rate) = vat_rate(country) else {
        return 0;
    };
    (amount_cents as f64 * rate).round() as i64
}

/// Shallow structural check for an EU VAT number: two-letter country
/// prefix followed by 8 to 12 alphanumeric characters. Full registry
/// validation is out of scope here.
#[must_use]
pub fn is_valid_vat_number(vat_number: &str) -> bool {
    if !vat_number.is_ascii() || !(10..=14).contains(&vat_number.len()) {
        return false;
    }
    let (prefix, rest) = vat_number.split_at(2);
    prefix.chars().all(|c| c.is_ascii_uppercase())
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn germany_rate() {
        assert_eq!(vat_rate("DE"), Some(0.19));
    }

    #[test]
    fn non_eu_has_no_rate() {
        assert_eq!(vat_rate("US"), None);
        assert_eq!(vat_rate("GB"), None);
        assert!(!is_eu_country("CH"));
    }

    #[test]
    fn consumer_in_germany_pays_vat() {
        // Starter package: 1000 cents at 19% -> 190 cents.
        assert_eq!(calculate_vat_cents(1000, "DE", false), 190);
    }

    #[test]
    fn business_pays_none() {
        assert_eq!(calculate_vat_cents(1000, "DE", true), 0);
    }

    #[test]
    fn non_eu_pays_none() {
        assert_eq!(calculate_vat_cents(1000, "US", false), 0);
    }

    #[test]
    fn vat_rounds_to_nearest_cent() {
        // 999 * 0.19 = 189.81 -> 190
        assert_eq!(calculate_vat_cents(999, "DE", false), 190);
        // 997 * 0.19 = 189.43 -> 189
        assert_eq!(calculate_vat_cents(997, "DE", false), 189);
    }

    #[test]
    fn vat_number_shape() {
        assert!(is_valid_vat_number("DE123456789"));
        assert!(is_valid_vat_number("FR12345678901"));
        assert!(!is_valid_vat_number("D123456789"));
        assert!(!is_valid_vat_number("DE1234"));
        assert!(!is_valid_vat_number("de123456789"));
        assert!(!is_valid_vat_number("DE12345 6789"));
    }
}
