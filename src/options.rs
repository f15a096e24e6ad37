//! ABOUTME: IndexOptions — HNSW build/capacity parameters
//! ABOUTME: Parsed from the second CREATE VIRTUAL TABLE module argument

use serde::Deserialize;

use crate::error::{Result, VectorliteError};

const DEFAULT_M: u32 = 16;
const DEFAULT_EF_CONSTRUCTION: u32 = 200;
const DEFAULT_RANDOM_SEED: i64 = 100;

/// Valid range for every integer field: `[1, 2^31)`.
const MAX_VALID: i64 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    pub max_elements: usize,
    pub m: u32,
    pub ef_construction: u32,
    pub random_seed: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsLiteral {
    max_elements: i64,
    #[serde(default)]
    #[serde(rename = "M")]
    m: Option<i64>,
    #[serde(default)]
    ef_construction: Option<i64>,
    #[serde(default)]
    random_seed: Option<i64>,
}

impl IndexOptions {
    /// Parse a JSON-shaped literal, e.g.
    /// `{"max_elements":100000,"M":16,"ef_construction":200,"random_seed":100}`.
    /// Every present integer must fall in `[1, 2^31)`.
    pub fn from_string(literal: &str) -> Result<Self> {
        let parsed: OptionsLiteral = serde_json::from_str(literal)
            .map_err(|e| VectorliteError::parse(format!("invalid options literal: {e}")))?;

        let max_elements = validate_range("max_elements", parsed.max_elements)?;
        let m = parsed
            .m
            .map(|v| validate_range("M", v))
            .transpose()?
            .map_or(DEFAULT_M, |v| v as u32);
        let ef_construction = parsed
            .ef_construction
            .map(|v| validate_range("ef_construction", v))
            .transpose()?
            .map_or(DEFAULT_EF_CONSTRUCTION, |v| v as u32);
        let random_seed = parsed.random_seed.unwrap_or(DEFAULT_RANDOM_SEED);

        Ok(Self {
            max_elements: max_elements as usize,
            m,
            ef_construction,
            random_seed,
        })
    }
}

fn validate_range(key: &str, value: i64) -> Result<i64> {
    if value < 1 || value >= MAX_VALID {
        return Err(VectorliteError::parse(format!(
            "'{key}' must be in [1, 2^31), got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults() {
        let opts = IndexOptions::from_string(r#"{"max_elements":1000}"#).unwrap();
        assert_eq!(opts.m, DEFAULT_M);
        assert_eq!(opts.ef_construction, DEFAULT_EF_CONSTRUCTION);
        assert_eq!(opts.random_seed, DEFAULT_RANDOM_SEED);
    }

    #[test]
    fn parses_full_literal() {
        let opts = IndexOptions::from_string(
            r#"{"max_elements":100000,"M":32,"ef_construction":400,"random_seed":7}"#,
        )
        .unwrap();
        assert_eq!(opts.max_elements, 100_000);
        assert_eq!(opts.m, 32);
        assert_eq!(opts.ef_construction, 400);
        assert_eq!(opts.random_seed, 7);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(IndexOptions::from_string(r#"{"max_elements":0}"#).is_err());
        assert!(IndexOptions::from_string(r#"{"max_elements":1,"M":0}"#).is_err());
        assert!(
            IndexOptions::from_string(&format!(r#"{{"max_elements":{}}}"#, 1i64 << 31)).is_err()
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(IndexOptions::from_string(r#"{"max_elements":1,"bogus":1}"#).is_err());
    }
}
