//! ABOUTME: Virtual-table adapter state machine: the vector_search module's
//! ABOUTME: VTab/Cursor types and the business logic behind each host hook
//!
//! The raw `xConnect`/`xBestIndex`/... C callback glue lives in
//! `vtab_ffi.rs`; this module holds the Rust-shaped state and the per-hook
//! logic those callbacks delegate to, so the unsafe surface stays as small
//! and reviewable as possible (the same split CGamesPlay's `sqlite3_ext`
//! crate uses between its public `vtab` traits and its `vtab::stubs` glue).

use std::collections::HashSet;

use rusqlite::ffi;

use crate::error::{Result, VectorliteError};
use crate::index::AnnIndex;
use crate::options::IndexOptions;
use crate::space::VectorSpace;
use crate::vector::Vector;

/// Column indices of the declared schema `(<col_name> BLOB, distance REAL HIDDEN)`.
pub const COL_VECTOR: i32 = 0;
pub const COL_DISTANCE: i32 = 1;

/// `idx_num` values BestIndex may hand to Filter. `NONE` means no usable
/// constraint was recognized and Filter must fail, since this table has no
/// other way to produce rows.
pub const IDX_NONE: i32 = 0;
pub const IDX_VECTOR: i32 = 1;
/// Reserved for a future rowid-filtering fast path; BestIndex acknowledges
/// the constraint (marks it as argv[2], omits it) but Filter treats it the
/// same as `IDX_NONE` today. See spec's "Planner tie-break" design note.
pub const IDX_ROWID: i32 = 2;

/// `sqlite3_index_constraint.op` base for function-valued constraints;
/// overloaded functions registered via `xFindFunction` report op codes at
/// or above this value.
pub const SQLITE_INDEX_CONSTRAINT_FUNCTION: u8 = 150;

/// The virtual table instance for one `CREATE VIRTUAL TABLE ... USING vector_search(...)`.
///
/// `#[repr(C)]` with `base` as the first field lets a `*mut VectorSearchTab`
/// and a `*mut ffi::sqlite3_vtab` alias the same memory — SQLite's handle
/// and this adapter's richer state coincide, avoiding an extra indirection
/// on every callback (spec's "Cursor + vtab ownership" design note).
#[repr(C)]
pub struct VectorSearchTab {
    pub base: ffi::sqlite3_vtab,
    pub space: VectorSpace,
    pub options: IndexOptions,
    pub index: AnnIndex,
    /// Existence check distinct from the index's own bookkeeping (spec §3
    /// "Known-row set"), even though today the two never disagree.
    pub known_rows: HashSet<i64>,
    /// Entered for the duration of `insert`/`run_vector_query`, so logs from
    /// a connection juggling several vector_search tables are attributable.
    pub span: tracing::Span,
}

impl VectorSearchTab {
    pub fn new(space: VectorSpace, options: IndexOptions) -> Self {
        let index = AnnIndex::new(space.dimension, space.metric, options);
        let span = tracing::info_span!("vector_search_table", column = %space.column_name);
        Self {
            base: unsafe { std::mem::zeroed() },
            space,
            options,
            index,
            known_rows: HashSet::new(),
            span,
        }
    }

    pub fn declare_sql(&self) -> String {
        format!(
            "CREATE TABLE x({} BLOB, distance REAL HIDDEN)",
            self.space.column_name
        )
    }

    /// §4.6 Update, INSERT path. `rowid` and `blob` are the already-decoded
    /// argv[1]/argv[2] values; validation of their *presence* and *shape*
    /// against the xUpdate calling convention happens in `vtab_ffi.rs`.
    pub fn insert(&mut self, rowid: i64, blob: &[u8]) -> Result<i64> {
        let _guard = self.span.enter();
        if rowid < 0 {
            return Err(VectorliteError::type_error(
                "rowid must be a non-negative integer",
            ));
        }
        if self.known_rows.contains(&rowid) {
            return Err(VectorliteError::DuplicateRowid { rowid });
        }

        let vector = Vector::from_blob(blob)?;
        if vector.dim() != self.space.dimension {
            return Err(VectorliteError::DimensionMismatch {
                expected: self.space.dimension,
                found: vector.dim(),
            });
        }
        let stored = if self.space.normalize {
            vector.normalize()
        } else {
            vector
        };

        self.index.add(rowid, stored)?;
        self.known_rows.insert(rowid);
        Ok(rowid)
    }
}

/// Per-open-query state (spec §3 "Cursor").
#[repr(C)]
pub struct VectorSearchCursor {
    pub base: ffi::sqlite3_vtab_cursor,
    pub result: Vec<(f32, i64)>,
    pub position: usize,
    pub query_vector: Option<Vector>,
}

impl VectorSearchCursor {
    pub fn new() -> Self {
        Self {
            base: unsafe { std::mem::zeroed() },
            result: Vec::new(),
            position: 0,
            query_vector: None,
        }
    }

    /// §4.6 Filter, `idx_num = IDX_VECTOR` path, given the already-extracted
    /// query vector and k.
    pub fn run_vector_query(&mut self, tab: &VectorSearchTab, query: Vector, k: u32) -> Result<()> {
        let _guard = tab.span.enter();
        if query.dim() != tab.space.dimension {
            return Err(VectorliteError::DimensionMismatch {
                expected: tab.space.dimension,
                found: query.dim(),
            });
        }
        let query = if tab.space.normalize {
            query.normalize()
        } else {
            query
        };
        self.result = tab.index.search_knn(query.as_slice(), k as usize);
        self.position = 0;
        self.query_vector = Some(query);
        Ok(())
    }

    pub fn next(&mut self) {
        if self.position < self.result.len() {
            self.position += 1;
        }
    }

    pub fn eof(&self) -> bool {
        self.position >= self.result.len()
    }

    pub fn current_distance(&self) -> Option<f32> {
        self.result.get(self.position).map(|(d, _)| *d)
    }

    pub fn current_rowid(&self) -> Result<i64> {
        self.result
            .get(self.position)
            .map(|(_, rowid)| *rowid)
            .ok_or_else(|| VectorliteError::type_error("cursor is at EOF"))
    }
}

impl Default for VectorSearchCursor {
    fn default() -> Self {
        Self::new()
    }
}
