//! ABOUTME: Raw sqlite3_module glue for the vector_search virtual table
//! ABOUTME: Bridges the C vtab ABI to VectorSearchTab/VectorSearchCursor in vtab.rs
//!
//! `rusqlite`'s safe `vtab` wrapper doesn't expose the function-constraint
//! overload path (`xFindFunction` / `SQLITE_INDEX_CONSTRAINT_FUNCTION`) or
//! raw `sqlite3_value*` access that the KNN parameter's pointer-tag
//! extraction needs, so this module talks to the C ABI directly — the same
//! layering `sqlite3_ext::vtab` uses (a small set of `extern "C"` stubs
//! behind a safe-looking module), confined to this one file.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};

use rusqlite::ffi;
use rusqlite::Connection;

use crate::error::VectorliteError;
use crate::knn_param;
use crate::options::IndexOptions;
use crate::space::VectorSpace;
use crate::vtab::{
    VectorSearchCursor, VectorSearchTab, COL_DISTANCE, COL_VECTOR, IDX_NONE, IDX_ROWID, IDX_VECTOR,
    SQLITE_INDEX_CONSTRAINT_FUNCTION,
};

const MODULE_NAME: &CStr = c"vector_search";
const KNN_SEARCH_FN_NAME: &CStr = c"knn_search";

/// Register the `vector_search` module and its two scalar functions on `conn`.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    knn_param::register(conn)?;

    // SAFETY: `conn.handle()` is a valid, open sqlite3* for the lifetime of
    // `conn`; MODULE is `'static` and its callbacks only ever dereference
    // pointers SQLite itself gives them.
    unsafe {
        let rc = ffi::sqlite3_create_module_v2(
            conn.handle(),
            MODULE_NAME.as_ptr(),
            &MODULE,
            std::ptr::null_mut(),
            None,
        );
        if rc != ffi::SQLITE_OK {
            return Err(rusqlite::Error::ModuleError(format!(
                "sqlite3_create_module_v2 failed with code {rc}"
            )));
        }
    }
    Ok(())
}

static MODULE: ffi::sqlite3_module = ffi::sqlite3_module {
    iVersion: 2,
    xCreate: Some(x_create),
    xConnect: Some(x_create),
    xBestIndex: Some(x_best_index),
    xDisconnect: Some(x_disconnect),
    xDestroy: Some(x_disconnect),
    xOpen: Some(x_open),
    xClose: Some(x_close),
    xFilter: Some(x_filter),
    xNext: Some(x_next),
    xEof: Some(x_eof),
    xColumn: Some(x_column),
    xRowid: Some(x_rowid),
    xUpdate: Some(x_update),
    xBegin: None,
    xSync: None,
    xCommit: None,
    xRollback: None,
    xFindFunction: Some(x_find_function),
    xRename: None,
    xSavepoint: None,
    xRelease: None,
    xRollbackTo: None,
    xShadowName: None,
};

unsafe fn str_arg(raw: *const c_char) -> Result<String, VectorliteError> {
    CStr::from_ptr(raw)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| VectorliteError::parse(format!("module argument is not valid UTF-8: {e}")))
}

/// `CREATE VIRTUAL TABLE t USING vector_search(<space>, <options>)` literals
/// arrive as the raw SQL token text, which may be wrapped in quotes the
/// parser didn't strip for us.
fn strip_outer_quotes(s: &str) -> &str {
    let s = s.trim();
    for (open, close) in [('\'', '\''), ('"', '"')] {
        if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

unsafe fn mprintf_error(pz_err: *mut *mut c_char, message: &str) {
    if pz_err.is_null() {
        return;
    }
    let c_msg = CString::new(message).unwrap_or_default();
    *pz_err = ffi::sqlite3_mprintf(c"%s".as_ptr(), c_msg.as_ptr());
}

unsafe fn set_vtab_error(vtab: *mut ffi::sqlite3_vtab, message: &str) {
    if !(*vtab).zErrMsg.is_null() {
        ffi::sqlite3_free((*vtab).zErrMsg as *mut c_void);
    }
    let c_msg = CString::new(message).unwrap_or_default();
    (*vtab).zErrMsg = ffi::sqlite3_mprintf(c"%s".as_ptr(), c_msg.as_ptr());
}

unsafe extern "C" fn x_create(
    db: *mut ffi::sqlite3,
    _aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    // Module name, db name, table name, then exactly two user literals.
    if argc != 5 {
        mprintf_error(
            pz_err,
            "vector_search requires exactly two arguments: a space literal and an options literal",
        );
        return ffi::SQLITE_ERROR;
    }
    let args = std::slice::from_raw_parts(argv, argc as usize);

    let result = (|| -> Result<VectorSearchTab, VectorliteError> {
        let space_literal = str_arg(args[3])?;
        let options_literal = str_arg(args[4])?;
        let space = VectorSpace::from_string(strip_outer_quotes(&space_literal))?;
        let options = IndexOptions::from_string(strip_outer_quotes(&options_literal))?;
        Ok(VectorSearchTab::new(space, options))
    })();

    let mut tab = match result {
        Ok(tab) => tab,
        Err(e) => {
            mprintf_error(pz_err, &e.to_string());
            e.log();
            return ffi::SQLITE_ERROR;
        }
    };

    let declare_sql = CString::new(tab.declare_sql()).unwrap();
    let rc = ffi::sqlite3_declare_vtab(db, declare_sql.as_ptr());
    if rc != ffi::SQLITE_OK {
        mprintf_error(pz_err, "sqlite3_declare_vtab failed");
        return rc;
    }

    // Enable BestIndex constraint support (xBestIndex may see usable
    // constraints it did not itself request).
    ffi::sqlite3_vtab_config(db, ffi::SQLITE_VTAB_CONSTRAINT_SUPPORT as c_int, 1);

    // Tell SQLite that `knn_search` may be implemented by a virtual table
    // module, so WHERE-clause uses of it surface as FUNCTION constraints in
    // xBestIndex instead of being evaluated as an ordinary scalar call.
    ffi::sqlite3_overload_function(db, KNN_SEARCH_FN_NAME.as_ptr(), 2);

    tracing::debug!(
        column = %tab.space.column_name,
        dimension = tab.space.dimension,
        max_elements = tab.options.max_elements,
        "vector_search table created"
    );

    let boxed = Box::new(tab);
    *pp_vtab = Box::into_raw(boxed) as *mut ffi::sqlite3_vtab;
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_disconnect(p_vtab: *mut ffi::sqlite3_vtab) -> c_int {
    if !p_vtab.is_null() {
        if !(*p_vtab).zErrMsg.is_null() {
            ffi::sqlite3_free((*p_vtab).zErrMsg as *mut c_void);
        }
        drop(Box::from_raw(p_vtab as *mut VectorSearchTab));
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_best_index(
    p_vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int {
    let _tab = &*(p_vtab as *mut VectorSearchTab);
    let info = &mut *info;

    let constraints =
        std::slice::from_raw_parts(info.aConstraint, info.nConstraint as usize);
    let usages =
        std::slice::from_raw_parts_mut(info.aConstraintUsage, info.nConstraint as usize);

    let mut idx_num = IDX_NONE;
    for (constraint, usage) in constraints.iter().zip(usages.iter_mut()) {
        if constraint.usable == 0 {
            continue;
        }
        if constraint.iColumn == COL_VECTOR && constraint.op >= SQLITE_INDEX_CONSTRAINT_FUNCTION {
            usage.argvIndex = 1;
            usage.omit = 1;
            idx_num = IDX_VECTOR;
        } else if constraint.iColumn < 0 {
            // rowid constraint; reserved, inert on the hot path (spec's
            // documented planner tie-break: last recognized wins).
            usage.argvIndex = 2;
            usage.omit = 1;
            idx_num = IDX_ROWID;
        }
    }

    info.idxNum = idx_num;
    info.estimatedCost = if idx_num == IDX_VECTOR { 1.0 } else { 1e9 };
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_open(
    p_vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
    let _ = p_vtab;
    let cursor = Box::new(VectorSearchCursor::new());
    *pp_cursor = Box::into_raw(cursor) as *mut ffi::sqlite3_vtab_cursor;
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_close(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    if !cursor.is_null() {
        drop(Box::from_raw(cursor as *mut VectorSearchCursor));
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_filter(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    _idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let cur = &mut *(cursor as *mut VectorSearchCursor);
    let tab = &*((*cursor).pVtab as *mut VectorSearchTab);

    if idx_num != IDX_VECTOR {
        set_vtab_error(
            (*cursor).pVtab,
            "vector_search requires a knn_search(col, knn_param(...)) constraint",
        );
        return ffi::SQLITE_ERROR;
    }
    if argc < 1 {
        set_vtab_error(
            (*cursor).pVtab,
            "knn_search constraint produced no argument",
        );
        return ffi::SQLITE_ERROR;
    }

    let args = std::slice::from_raw_parts(argv, argc as usize);
    let param = match knn_param::extract(args[0]) {
        Some(p) => p,
        None => {
            set_vtab_error(
                (*cursor).pVtab,
                "knn_param() must be used as the 2nd argument of knn_search",
            );
            return ffi::SQLITE_ERROR;
        }
    };

    let query = param.query_vector.clone();
    let k = param.k;
    match cur.run_vector_query(tab, query, k) {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => {
            set_vtab_error((*cursor).pVtab, &e.to_string());
            e.log();
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn x_next(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cur = &mut *(cursor as *mut VectorSearchCursor);
    cur.next();
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_eof(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cur = &*(cursor as *mut VectorSearchCursor);
    c_int::from(cur.eof())
}

unsafe extern "C" fn x_column(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    n: c_int,
) -> c_int {
    let cur = &*(cursor as *mut VectorSearchCursor);
    let tab = &*((*cursor).pVtab as *mut VectorSearchTab);

    match n {
        COL_VECTOR => {
            let rowid = match cur.current_rowid() {
                Ok(r) => r,
                Err(_) => {
                    ffi::sqlite3_result_null(ctx);
                    return ffi::SQLITE_OK;
                }
            };
            match tab.index.get_by_label(rowid) {
                Ok(vector) => {
                    let blob = vector.to_blob();
                    ffi::sqlite3_result_blob(
                        ctx,
                        blob.as_ptr() as *const c_void,
                        blob.len() as c_int,
                        Some(transient_destructor()),
                    );
                }
                Err(e) => {
                    let msg = e.to_string();
                    ffi::sqlite3_result_error(ctx, msg.as_ptr() as *const c_char, msg.len() as c_int);
                }
            }
        }
        COL_DISTANCE => match cur.current_distance() {
            Some(d) => ffi::sqlite3_result_double(ctx, f64::from(d)),
            None => ffi::sqlite3_result_null(ctx),
        },
        _ => {
            let msg = format!("Invalid column index: {n}");
            ffi::sqlite3_result_error(ctx, msg.as_ptr() as *const c_char, msg.len() as c_int);
        }
    }
    ffi::SQLITE_OK
}

/// `SQLITE_TRANSIENT`: tells SQLite to copy the blob immediately, since our
/// `Vec<u8>` is dropped at the end of `x_column`.
fn transient_destructor() -> unsafe extern "C" fn(*mut c_void) {
    unsafe extern "C" fn transient(_: *mut c_void) {}
    // SQLite recognizes the sentinel value -1 cast to this function pointer
    // type as SQLITE_TRANSIENT; see sqlite3.h's definition of the macro.
    unsafe { std::mem::transmute(-1isize) }
}

unsafe extern "C" fn x_rowid(cursor: *mut ffi::sqlite3_vtab_cursor, p_rowid: *mut ffi::sqlite3_int64) -> c_int {
    let cur = &*(cursor as *mut VectorSearchCursor);
    match cur.current_rowid() {
        Ok(rowid) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        Err(e) => {
            set_vtab_error((*cursor).pVtab, &e.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn x_update(
    p_vtab: *mut ffi::sqlite3_vtab,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let tab = &mut *(p_vtab as *mut VectorSearchTab);
    let args = std::slice::from_raw_parts(argv, argc as usize);

    let is_insert = argc > 2 && ffi::sqlite3_value_type(args[0]) == ffi::SQLITE_NULL && !args[1].is_null();
    if !is_insert {
        set_vtab_error(p_vtab, "Operation not supported");
        return ffi::SQLITE_ERROR;
    }

    let result = (|| -> Result<i64, VectorliteError> {
        if ffi::sqlite3_value_type(args[1]) != ffi::SQLITE_INTEGER {
            return Err(VectorliteError::type_error(
                "rowid argument must be an integer",
            ));
        }
        if ffi::sqlite3_value_type(args[2]) != ffi::SQLITE_BLOB {
            return Err(VectorliteError::type_error(
                "vector column argument must be a blob",
            ));
        }

        let rowid = ffi::sqlite3_value_int64(args[1]);
        let blob_len = ffi::sqlite3_value_bytes(args[2]) as usize;
        let blob_ptr = ffi::sqlite3_value_blob(args[2]);
        let blob: &[u8] = if blob_len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(blob_ptr as *const u8, blob_len)
        };

        tab.insert(rowid, blob)
    })();

    match result {
        Ok(rowid) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        Err(e) => {
            set_vtab_error(p_vtab, &e.to_string());
            e.log();
            match e {
                VectorliteError::CapacityExceeded { .. } => ffi::SQLITE_FULL,
                VectorliteError::DuplicateRowid { .. } => ffi::SQLITE_CONSTRAINT,
                _ => ffi::SQLITE_ERROR,
            }
        }
    }
}

unsafe extern "C" fn x_find_function(
    _p_vtab: *mut ffi::sqlite3_vtab,
    n_arg: c_int,
    z_name: *const c_char,
    px_func: *mut Option<unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value)>,
    _pp_arg: *mut *mut c_void,
) -> c_int {
    if n_arg == 2 && CStr::from_ptr(z_name) == KNN_SEARCH_FN_NAME {
        *px_func = Some(knn_search_noop);
        return c_int::from(SQLITE_INDEX_CONSTRAINT_FUNCTION);
    }
    0
}

unsafe extern "C" fn knn_search_noop(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    _argv: *mut *mut ffi::sqlite3_value,
) {
    ffi::sqlite3_result_null(ctx);
}
