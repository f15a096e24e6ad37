//! ABOUTME: VectorSpace — column name, dimension, metric and normalize flag
//! ABOUTME: Parsed from the first CREATE VIRTUAL TABLE module argument

use serde::Deserialize;

use crate::error::{Result, VectorliteError};

/// The distance metric a vector column is indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    L2,
    Ip,
    Cosine,
}

/// `(column_name, dimension, metric, normalize)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpace {
    pub column_name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub normalize: bool,
}

/// Wire shape of the `<space_literal>` JSON object, e.g.
/// `{"name":"v","dim":128,"distance_type":"l2"}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpaceLiteral {
    name: String,
    dim: usize,
    distance_type: DistanceType,
    #[serde(default)]
    normalize: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DistanceType {
    L2,
    Ip,
    Cosine,
}

impl VectorSpace {
    /// Parse a JSON-shaped literal. Unknown keys are a parse error.
    /// `metric = Cosine` forces `normalize = true`; otherwise `normalize`
    /// defaults to false unless explicitly set.
    pub fn from_string(literal: &str) -> Result<Self> {
        let parsed: SpaceLiteral = serde_json::from_str(literal)
            .map_err(|e| VectorliteError::parse(format!("invalid space literal: {e}")))?;

        if parsed.dim == 0 {
            return Err(VectorliteError::parse("dim must be a positive integer"));
        }
        if !is_valid_identifier(&parsed.name) {
            return Err(VectorliteError::parse(format!(
                "'{}' is not a valid column identifier",
                parsed.name
            )));
        }

        let metric = match parsed.distance_type {
            DistanceType::L2 => Metric::L2,
            DistanceType::Ip => Metric::Ip,
            DistanceType::Cosine => Metric::Cosine,
        };

        let normalize = match metric {
            Metric::Cosine => true,
            _ => parsed.normalize.unwrap_or(false),
        };

        Ok(Self {
            column_name: parsed.name,
            dimension: parsed.dim,
            metric,
            normalize,
        })
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
