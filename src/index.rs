//! ABOUTME: ANN index wrapper around hnsw_rs, indexed by the caller's i64 rowid
//! ABOUTME: Owns the stored (possibly normalized) vectors; adapter keeps no second copy

use std::collections::HashMap;

use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::{DistCosine, DistDot, DistL2};

use crate::error::{Result, VectorliteError};
use crate::options::IndexOptions;
use crate::space::Metric;
use crate::vector::Vector;

/// `hnsw_rs::Hnsw` is generic over its distance functor, not dynamic, so the
/// three metrics this crate supports become three enum arms rather than a
/// trait object — the same shape the teacher's HNSW binding uses for its own
/// per-metric dispatch.
enum Backend {
    L2(Hnsw<'static, f32, DistL2>),
    Ip(Hnsw<'static, f32, DistDot>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

impl Backend {
    fn insert(&self, data: &[f32], label: usize) {
        match self {
            Backend::L2(h) => h.insert((data, label)),
            Backend::Ip(h) => h.insert((data, label)),
            Backend::Cosine(h) => h.insert((data, label)),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbour> {
        match self {
            Backend::L2(h) => h.search(query, k, ef),
            Backend::Ip(h) => h.search(query, k, ef),
            Backend::Cosine(h) => h.search(query, k, ef),
        }
    }
}

/// An HNSW graph over the labels handed to `add`, which in this system are
/// always the caller's rowid. `hnsw_rs` does not expose a "fetch vector by
/// label" accessor, so this wrapper retains a dense side table
/// (`vector_of`, indexed by internal point id) alongside the graph.
pub struct AnnIndex {
    backend: Backend,
    dim: usize,
    max_elements: usize,
    /// Internal hnsw_rs point id -> stored (possibly normalized) vector.
    vector_of: Vec<Vector>,
    /// Caller rowid -> internal hnsw_rs point id.
    point_of_rowid: HashMap<i64, usize>,
}

impl AnnIndex {
    pub fn new(dim: usize, metric: Metric, options: IndexOptions) -> Self {
        let max_elements = options.max_elements;
        // Mirrors the layer-count heuristic used elsewhere in this codebase
        // for hnsw_rs bindings: bounded by both a constant ceiling and the
        // natural log of the expected element count.
        let nb_layers = 16.min((max_elements.max(1) as f32).ln() as usize).max(1);
        let m = options.m as usize;
        let efc = options.ef_construction as usize;

        let backend = match metric {
            Metric::L2 => Backend::L2(Hnsw::new(m, max_elements, nb_layers, efc, DistL2)),
            Metric::Ip => Backend::Ip(Hnsw::new(m, max_elements, nb_layers, efc, DistDot)),
            Metric::Cosine => {
                Backend::Cosine(Hnsw::new(m, max_elements, nb_layers, efc, DistCosine))
            }
        };

        Self {
            backend,
            dim,
            max_elements,
            vector_of: Vec::new(),
            point_of_rowid: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vector_of.len()
    }

    pub fn contains(&self, rowid: i64) -> bool {
        self.point_of_rowid.contains_key(&rowid)
    }

    /// Insert a point. Fails if `rowid` already exists or the index is full.
    pub fn add(&mut self, rowid: i64, vector: Vector) -> Result<()> {
        if self.point_of_rowid.contains_key(&rowid) {
            return Err(VectorliteError::DuplicateRowid { rowid });
        }
        if self.vector_of.len() >= self.max_elements {
            return Err(VectorliteError::CapacityExceeded {
                max_elements: self.max_elements,
            });
        }
        let point_id = self.vector_of.len();
        self.backend.insert(vector.as_slice(), point_id);
        self.vector_of.push(vector);
        self.point_of_rowid.insert(rowid, point_id);
        Ok(())
    }

    /// k-NN search, ordered by ascending distance. May return fewer than
    /// `k` entries if the index holds fewer points.
    pub fn search_knn(&self, query: &[f32], k: usize) -> Vec<(f32, i64)> {
        if self.vector_of.is_empty() {
            return Vec::new();
        }
        // ef must be >= k for hnsw_rs to consider enough candidates.
        let ef = k.max(self.vector_of.len().min(64));
        let rowid_of: HashMap<usize, i64> = self
            .point_of_rowid
            .iter()
            .map(|(&rowid, &point_id)| (point_id, rowid))
            .collect();

        let mut hits: Vec<(f32, i64)> = self
            .backend
            .search(query, k, ef)
            .into_iter()
            .filter_map(|n| rowid_of.get(&n.d_id).map(|&rowid| (n.distance, rowid)))
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    pub fn get_by_label(&self, rowid: i64) -> Result<&Vector> {
        let point_id = self
            .point_of_rowid
            .get(&rowid)
            .ok_or(VectorliteError::NotFound { label: rowid })?;
        Ok(&self.vector_of[*point_id])
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
