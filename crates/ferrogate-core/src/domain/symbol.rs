use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical exchange tag appended to Tadawul symbols.
pub const SAUDI_EXCHANGE_TAG: &str = ":Tadawul";
/// Exchange MIC reported for Tadawul listings.
pub const SAUDI_EXCHANGE_CODE: &str = "XSAU";
pub const SAUDI_CURRENCY: &str = "SAR";
pub const SAUDI_TIMEZONE: &str = "Asia/Riyadh";
pub const DEFAULT_CURRENCY: &str = "USD";

/// Country-code style suffixes users type for Tadawul listings.
const SAUDI_ALIASES: [&str; 2] = [".SAU", ".SR"];

/// Market a normalized symbol routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Generic,
    Saudi,
}

/// Normalized market symbol in the provider's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    raw: String,
    normalized: String,
    market: Market,
}

impl Symbol {
    /// Normalize a user-supplied ticker.
    ///
    /// Tadawul codes (`4261`, `12345`, `2222A`, `1180.SAU`) gain the `:Tadawul`
    /// exchange tag; everything else is uppercased and trimmed.
    pub fn normalize(input: &str) -> Result<Self, ValidationError> {
        let cleaned = input.trim().to_ascii_uppercase();
        if cleaned.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let (normalized, market) = classify(&cleaned)?;
        Ok(Self {
            raw: input.to_owned(),
            normalized,
            market,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub const fn market(&self) -> Market {
        self.market
    }

    pub const fn is_saudi(&self) -> bool {
        matches!(self.market, Market::Saudi)
    }

    /// Symbol without the exchange tag.
    pub fn base(&self) -> &str {
        self.normalized
            .strip_suffix(SAUDI_EXCHANGE_TAG)
            .unwrap_or(&self.normalized)
    }

    pub const fn currency(&self) -> &'static str {
        match self.market {
            Market::Saudi => SAUDI_CURRENCY,
            Market::Generic => DEFAULT_CURRENCY,
        }
    }

    pub const fn exchange(&self) -> &'static str {
        match self.market {
            Market::Saudi => SAUDI_EXCHANGE_CODE,
            Market::Generic => "",
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::normalize(value)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

fn classify(cleaned: &str) -> Result<(String, Market), ValidationError> {
    // `cleaned` is uppercase, so the tag is matched against its uppercase form.
    let upper_tag = SAUDI_EXCHANGE_TAG.to_ascii_uppercase();
    if let Some(base) = cleaned.strip_suffix(upper_tag.as_str()) {
        return saudi(base);
    }

    for alias in SAUDI_ALIASES {
        if let Some(base) = cleaned.strip_suffix(alias) {
            return saudi(base);
        }
    }

    if is_saudi_code(cleaned) {
        return saudi(cleaned);
    }

    Ok((cleaned.to_owned(), Market::Generic))
}

fn saudi(base: &str) -> Result<(String, Market), ValidationError> {
    if base.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    Ok((format!("{base}{SAUDI_EXCHANGE_TAG}"), Market::Saudi))
}

/// Tadawul listing codes: four or five digits, four digits plus a letter and
/// an optional series digit, or four digits plus an all-letter suffix.
///
/// A suffix of exactly two letters (`2222AB`) is not a Tadawul code.
pub fn is_saudi_code(symbol: &str) -> bool {
    let bytes = symbol.as_bytes();
    if bytes.len() < 4 || !bytes[..4].iter().all(u8::is_ascii_digit) {
        return false;
    }

    match &bytes[4..] {
        [] => true,
        [fifth] => fifth.is_ascii_digit() || fifth.is_ascii_alphabetic(),
        [letter, digit] if digit.is_ascii_digit() => letter.is_ascii_alphabetic(),
        [_, _] => false,
        suffix => suffix.iter().all(u8::is_ascii_alphabetic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(input: &str) -> String {
        Symbol::normalize(input)
            .expect("symbol should normalize")
            .as_str()
            .to_owned()
    }

    #[test]
    fn generic_symbol_is_uppercased_and_trimmed() {
        let symbol = Symbol::normalize(" aapl ").expect("symbol should normalize");
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(symbol.raw(), " aapl ");
        assert_eq!(symbol.market(), Market::Generic);
        assert_eq!(symbol.currency(), "USD");
    }

    #[test]
    fn saudi_codes_gain_exchange_tag() {
        assert_eq!(normalized("4261"), "4261:Tadawul");
        assert_eq!(normalized("12345"), "12345:Tadawul");
        assert_eq!(normalized("2222a"), "2222A:Tadawul");
        assert_eq!(normalized("2222A1"), "2222A1:Tadawul");
    }

    #[test]
    fn two_letter_suffix_stays_generic() {
        let symbol = Symbol::normalize("2222AB").expect("symbol should normalize");
        assert_eq!(symbol.market(), Market::Generic);
        assert_eq!(symbol.as_str(), "2222AB");
        assert!(!is_saudi_code("123456"));
        assert!(!is_saudi_code("123"));
        assert!(!is_saudi_code("1180A12"));
    }

    #[test]
    fn longer_alphabetic_suffixes_are_saudi() {
        assert_eq!(normalized("1180abc"), "1180ABC:Tadawul");
        assert_eq!(normalized("1010XYZW"), "1010XYZW:Tadawul");
        assert!(is_saudi_code("2222ABCDE"));
        assert!(!is_saudi_code("2222AB1"));
        assert!(!is_saudi_code("A2222"));
    }

    #[test]
    fn aliases_are_rewritten_to_canonical_tag() {
        assert_eq!(normalized("4261.sau"), "4261:Tadawul");
        assert_eq!(normalized("1180.SR"), "1180:Tadawul");
    }

    #[test]
    fn already_tagged_symbol_keeps_canonical_casing() {
        assert_eq!(normalized("4261:TADAWUL"), "4261:Tadawul");
        assert_eq!(normalized("4261:tadawul"), "4261:Tadawul");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "aapl", "4261", "12345", "2222A", "2222AB", "1180.SAU", "7040:Tadawul", "brk.b",
            "2222A1", "1180ABC", "msft ",
        ] {
            let once = normalized(input);
            let twice = normalized(&once);
            assert_eq!(once, twice, "normalizing {input} twice changed the result");
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(Symbol::normalize("   "), Err(ValidationError::EmptySymbol));
        assert_eq!(Symbol::normalize(".SAU"), Err(ValidationError::EmptySymbol));
    }

    #[test]
    fn base_strips_exchange_tag() {
        let symbol = Symbol::normalize("2222").expect("symbol should normalize");
        assert_eq!(symbol.base(), "2222");
        assert_eq!(symbol.exchange(), "XSAU");
        assert_eq!(symbol.currency(), "SAR");
    }
}
