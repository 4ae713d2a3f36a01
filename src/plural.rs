//! CLDR plural category selection.
//!
//! Selection is total: non-finite numbers and unknown locales both land on
//! [`PluralCategory::Other`] instead of failing. Precision matters — the
//! selector builds its operands from [`FluentNumber::plural_repr`], so a
//! number formatted with one visible fraction digit selects with the
//! fractional operand forms (`1.0` is `other` in English where `1` is
//! `one`).

use serde::Serialize;

use crate::locale::LocaleContext;
use crate::value::FluentNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl PluralCategory {
    /// The identifier spelled in FTL variant keys.
    pub fn as_str(self) -> &'static str {
        match self {
            PluralCategory::Zero => "zero",
            PluralCategory::One => "one",
            PluralCategory::Two => "two",
            PluralCategory::Few => "few",
            PluralCategory::Many => "many",
            PluralCategory::Other => "other",
        }
    }
}

impl From<intl_pluralrules::PluralCategory> for PluralCategory {
    fn from(c: intl_pluralrules::PluralCategory) -> Self {
        use intl_pluralrules::PluralCategory as C;
        match c {
            C::ZERO => PluralCategory::Zero,
            C::ONE => PluralCategory::One,
            C::TWO => PluralCategory::Two,
            C::FEW => PluralCategory::Few,
            C::MANY => PluralCategory::Many,
            C::OTHER => PluralCategory::Other,
        }
    }
}

/// Select the CLDR cardinal category of `number` under `locale`.
pub fn select_plural_category(number: &FluentNumber, locale: &LocaleContext) -> PluralCategory {
    if !number.is_finite() {
        return PluralCategory::Other;
    }
    let Some(rules) = locale.plural_rules() else {
        // Unknown locale data: the CLDR root guarantees `other`.
        return PluralCategory::Other;
    };
    let repr = number.plural_repr();
    match rules.select(repr.as_str()) {
        Ok(category) => category.into(),
        Err(_) => PluralCategory::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn locale(code: &str) -> std::sync::Arc<LocaleContext> {
        LocaleContext::obtain(code).unwrap()
    }

    #[test]
    fn english_one_other() {
        let en = locale("en");
        assert_eq!(
            select_plural_category(&FluentNumber::integer(1), &en),
            PluralCategory::One
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(5), &en),
            PluralCategory::Other
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(0), &en),
            PluralCategory::Other
        );
    }

    #[test]
    fn english_precision_changes_category() {
        let en = locale("en");
        let mut one = FluentNumber::integer(1);
        assert_eq!(select_plural_category(&one, &en), PluralCategory::One);
        // "1.0" selects with v=1, which is `other` in English.
        one.precision = Some(1);
        assert_eq!(select_plural_category(&one, &en), PluralCategory::Other);
    }

    #[test]
    fn latvian_three_categories() {
        let lv = locale("lv");
        assert_eq!(
            select_plural_category(&FluentNumber::integer(0), &lv),
            PluralCategory::Zero
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(1), &lv),
            PluralCategory::One
        );
        // 21 ends in 1 but not 11: `one` under Latvian rules.
        assert_eq!(
            select_plural_category(&FluentNumber::integer(21), &lv),
            PluralCategory::One
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(11), &lv),
            PluralCategory::Zero
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(2), &lv),
            PluralCategory::Other
        );
    }

    #[test]
    fn russian_few_many() {
        let ru = locale("ru");
        assert_eq!(
            select_plural_category(&FluentNumber::integer(2), &ru),
            PluralCategory::Few
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(5), &ru),
            PluralCategory::Many
        );
        assert_eq!(
            select_plural_category(&FluentNumber::integer(21), &ru),
            PluralCategory::One
        );
    }

    #[test]
    fn nonfinite_is_other() {
        let en = locale("en");
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                select_plural_category(&FluentNumber::float(f), &en),
                PluralCategory::Other
            );
        }
    }

    #[test]
    fn decimals_select_fractional_forms() {
        let en = locale("en");
        let d = FluentNumber::decimal(Decimal::from_str("1.5").unwrap());
        assert_eq!(select_plural_category(&d, &en), PluralCategory::Other);
    }

    #[test]
    fn category_totality() {
        let en = locale("en");
        for i in -20..200 {
            let c = select_plural_category(&FluentNumber::integer(i), &en);
            assert!(matches!(
                c,
                PluralCategory::Zero
                    | PluralCategory::One
                    | PluralCategory::Two
                    | PluralCategory::Few
                    | PluralCategory::Many
                    | PluralCategory::Other
            ));
        }
    }
}
