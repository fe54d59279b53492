//! Currency codes and the BASE/QUOTE pair key used for every threshold lookup.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Three letter, upper-cased ISO-style currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("Invalid currency code: {}", s);
        }
        Ok(CurrencyCode(code.to_ascii_uppercase()))
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered currency pair, e.g. `AUD/CNY` quotes how many CNY one AUD buys.
///
/// Serialized as the `"BASE/QUOTE"` string so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Result<Self> {
        let base: CurrencyCode = base.parse()?;
        let quote: CurrencyCode = quote.parse()?;
        if base == quote {
            bail!("Currency pair must use two different codes: {}/{}", base, quote);
        }
        Ok(CurrencyPair { base, quote })
    }
}

impl FromStr for CurrencyPair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("Invalid currency pair (expected BASE/QUOTE): {}", s))?;
        CurrencyPair::new(base, quote)
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> String {
        pair.to_string()
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_parse_normalizes_case() {
        let pair: CurrencyPair = "aud/Cny".parse().unwrap();
        assert_eq!(pair.base.as_str(), "AUD");
        assert_eq!(pair.quote.as_str(), "CNY");
        assert_eq!(pair.to_string(), "AUD/CNY");
    }

    #[test]
    fn test_pair_parse_rejects_malformed() {
        assert!("AUDCNY".parse::<CurrencyPair>().is_err());
        assert!("AU/CNY".parse::<CurrencyPair>().is_err());
        assert!("AUD/C1Y".parse::<CurrencyPair>().is_err());
        assert!("AUD/aud".parse::<CurrencyPair>().is_err());
    }

    #[test]
    fn test_pair_serde_as_string() {
        let pair = CurrencyPair::new("usd", "aud").unwrap();
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r#""USD/AUD""#);

        let back: CurrencyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);

        assert!(serde_json::from_str::<CurrencyPair>(r#""USDAUD""#).is_err());
    }
}
