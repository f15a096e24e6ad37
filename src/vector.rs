//! ABOUTME: Fixed-width f32 vector value type: blob codec and L2 normalization
//! ABOUTME: Pure, value-like; the hot paths (insert, filter) move rather than clone

use crate::error::{Result, VectorliteError};

/// An ordered sequence of 32-bit IEEE-754 floats of length `d >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector(Vec<f32>);

impl Vector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Decode a little-endian, header-less blob into a `Vector`.
    ///
    /// Succeeds iff `len(bytes) > 0` and `len(bytes) % 4 == 0`.
    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(VectorliteError::decode(format!(
                "blob length {} is not a positive multiple of 4",
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self(values))
    }

    /// Bit-exact inverse of `from_blob`.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Returns a new vector scaled to unit Euclidean norm. A zero vector
    /// normalizes to itself (deterministic, documented fixed point).
    #[must_use]
    pub fn normalize(&self) -> Self {
        let norm: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return self.clone();
        }
        Self(self.0.iter().map(|x| x / norm).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let v = Vector::new(vec![1.0, -2.5, 0.0, 3.25]);
        let blob = v.to_blob();
        assert_eq!(Vector::from_blob(&blob).unwrap(), v);
    }

    #[test]
    fn from_blob_rejects_empty() {
        assert!(Vector::from_blob(&[]).is_err());
    }

    #[test]
    fn from_blob_rejects_non_multiple_of_four() {
        assert!(Vector::from_blob(&[0u8; 7]).is_err());
    }

    #[test]
    fn from_blob_dimension_matches_byte_length() {
        let v = Vector::from_blob(&[0u8; 12]).unwrap();
        assert_eq!(v.dim(), 3);
    }

    #[test]
    fn normalize_unit_norm() {
        let v = Vector::new(vec![3.0, 4.0]);
        let n = v.normalize();
        let norm: f32 = n.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_fixed_point() {
        let v = Vector::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(v.normalize(), v);
    }

    #[test]
    fn normalize_scale_invariant_direction() {
        let a = Vector::new(vec![2.0, 0.0]).normalize();
        let b = Vector::new(vec![5.0, 0.0]).normalize();
        assert_eq!(a, b);
    }
}
