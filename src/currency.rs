//! ISO 4217 currency data.
//!
//! The static table is authoritative for fraction-digit counts; where CLDR
//! disagrees (it does for a handful of currencies), ISO wins. Codes absent
//! from the table format with [`ISO_4217_DEFAULT_DECIMALS`] digits and
//! their code as symbol.

/// Fraction digits for codes not listed in [`ISO_4217_DECIMAL_DIGITS`].
pub const ISO_4217_DEFAULT_DECIMALS: u32 = 2;

/// `(code, decimal digits, symbol, english name)` for common currencies.
/// Digits follow ISO 4217 Amendment lists, not CLDR.
pub const ISO_4217_DECIMAL_DIGITS: &[(&str, u32, &str, &str)] = &[
    ("AED", 2, "د.إ", "UAE dirhams"),
    ("AUD", 2, "A$", "Australian dollars"),
    ("BHD", 3, ".د.ب", "Bahraini dinars"),
    ("BRL", 2, "R$", "Brazilian reais"),
    ("CAD", 2, "CA$", "Canadian dollars"),
    ("CHF", 2, "CHF", "Swiss francs"),
    ("CLP", 0, "CLP$", "Chilean pesos"),
    ("CNY", 2, "¥", "Chinese yuan"),
    ("CZK", 2, "Kč", "Czech koruny"),
    ("DKK", 2, "kr", "Danish kroner"),
    ("EUR", 2, "€", "euros"),
    ("GBP", 2, "£", "British pounds"),
    ("HKD", 2, "HK$", "Hong Kong dollars"),
    ("HUF", 2, "Ft", "Hungarian forints"),
    ("IDR", 2, "Rp", "Indonesian rupiahs"),
    ("ILS", 2, "₪", "Israeli new shekels"),
    ("INR", 2, "₹", "Indian rupees"),
    ("ISK", 0, "ISK", "Icelandic krónur"),
    ("JOD", 3, "JD", "Jordanian dinars"),
    ("JPY", 0, "¥", "Japanese yen"),
    ("KRW", 0, "₩", "South Korean won"),
    ("KWD", 3, "KD", "Kuwaiti dinars"),
    ("MXN", 2, "MX$", "Mexican pesos"),
    ("NOK", 2, "kr", "Norwegian kroner"),
    ("NZD", 2, "NZ$", "New Zealand dollars"),
    ("OMR", 3, "﷼", "Omani rials"),
    ("PLN", 2, "zł", "Polish złoty"),
    ("RUB", 2, "₽", "Russian rubles"),
    ("SEK", 2, "kr", "Swedish kronor"),
    ("SGD", 2, "S$", "Singapore dollars"),
    ("THB", 2, "฿", "Thai baht"),
    ("TND", 3, "DT", "Tunisian dinars"),
    ("TRY", 2, "₺", "Turkish lira"),
    ("TWD", 2, "NT$", "New Taiwan dollars"),
    ("USD", 2, "$", "US dollars"),
    ("VND", 0, "₫", "Vietnamese dong"),
    ("ZAR", 2, "R", "South African rand"),
];

fn lookup(code: &str) -> Option<&'static (&'static str, u32, &'static str, &'static str)> {
    ISO_4217_DECIMAL_DIGITS.iter().find(|(c, ..)| *c == code)
}

/// Three ASCII uppercase letters.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Fraction digits per ISO 4217 (default for unlisted codes).
pub fn decimal_digits(code: &str) -> u32 {
    lookup(code).map(|(_, d, ..)| *d).unwrap_or(ISO_4217_DEFAULT_DECIMALS)
}

/// Display symbol; unlisted codes fall back to the code itself.
pub fn symbol(code: &str) -> &str {
    lookup(code).map(|(_, _, s, _)| *s).unwrap_or(code)
}

/// English display name; unlisted codes fall back to the code itself.
pub fn display_name(code: &str) -> &str {
    lookup(code).map(|(.., n)| *n).unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_format_validation() {
        assert!(is_valid_code("USD"));
        assert!(is_valid_code("XXX"));
        assert!(!is_valid_code("usd"));
        assert!(!is_valid_code("US"));
        assert!(!is_valid_code("USDT"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn iso_digit_counts() {
        assert_eq!(decimal_digits("USD"), 2);
        assert_eq!(decimal_digits("JPY"), 0);
        assert_eq!(decimal_digits("BHD"), 3);
        assert_eq!(decimal_digits("KWD"), 3);
        // Unknown codes use the ISO default.
        assert_eq!(decimal_digits("ZZZ"), 2);
    }

    #[test]
    fn symbols_and_names() {
        assert_eq!(symbol("USD"), "$");
        assert_eq!(symbol("EUR"), "€");
        assert_eq!(symbol("ZZZ"), "ZZZ");
        assert_eq!(display_name("USD"), "US dollars");
        assert_eq!(display_name("ZZZ"), "ZZZ");
    }

    #[test]
    fn table_codes_are_unique_and_valid() {
        let mut seen = std::collections::HashSet::new();
        for (code, ..) in ISO_4217_DECIMAL_DIGITS {
            assert!(is_valid_code(code), "bad code in table: {code}");
            assert!(seen.insert(*code), "duplicate code in table: {code}");
        }
    }
}
