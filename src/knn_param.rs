//! ABOUTME: KNN parameter object — the opaque (query_vector, k) value smuggled
//! ABOUTME: through SQLite's pointer-passing ABI (sqlite3_{result,value}_pointer)
//!
//! SQLite's value ABI has no typed "user object" slot; the closest primitive
//! is a pointer tagged with a constant C string, compared by SQLite itself
//! on extraction (`sqlite3_value_pointer` returns NULL on a tag mismatch).
//! `rusqlite`'s safe `functions` module does not wrap this primitive, so this
//! module is a thin, deliberately small unsafe shim around the three raw
//! calls involved, mirroring how low-level vtab glue (e.g.
//! `sqlite3_ext::vtab`) keeps unsafe FFI confined to one place behind a safe
//! surface.

use std::ffi::CStr;
use std::os::raw::{c_int, c_void};

use rusqlite::ffi;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::vector::Vector;

/// Constant discriminator tagging `knn_param` pointer values. Any pointer
/// extracted under a different tag is treated as absent, never as this type.
pub const KNN_PARAM_TAG: &CStr = c"vector_search_knn_param";

/// Heap-allocated `(query_vector, k)` tuple, single-owner: created by
/// `knn_param`, consumed by the matching `knn_search` argument binding,
/// freed by `destroy` when SQLite discards the value.
pub struct KnnParam {
    pub query_vector: Vector,
    pub k: u32,
}

/// Register the `knn_param(blob, k)` and `knn_search(col, param)` scalar
/// functions on `conn`. Must be called once per connection before the
/// `vector_search` module is exercised.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    // SAFETY: the callback only reads its declared argc/argv and writes a
    // result through the context it is given by SQLite, per the C API
    // contract for xFunc callbacks.
    unsafe {
        conn.create_scalar_function_raw(
            "knn_param",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            Some(knn_param_fn),
        )?;
        conn.create_scalar_function_raw(
            "knn_search",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            Some(knn_search_marker_fn),
        )?;
    }
    Ok(())
}

unsafe extern "C" fn knn_param_fn(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    debug_assert_eq!(argc, 2);
    let args = std::slice::from_raw_parts(argv, argc as usize);

    if ffi::sqlite3_value_type(args[0]) != ffi::SQLITE_BLOB {
        result_error(ctx, "knn_param: first argument must be a blob");
        return;
    }
    if ffi::sqlite3_value_type(args[1]) != ffi::SQLITE_INTEGER {
        result_error(ctx, "knn_param: second argument must be an integer");
        return;
    }

    let blob_ptr = ffi::sqlite3_value_blob(args[0]);
    let blob_len = ffi::sqlite3_value_bytes(args[0]) as usize;
    let bytes = if blob_len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(blob_ptr as *const u8, blob_len)
    };

    let query_vector = match Vector::from_blob(bytes) {
        Ok(v) => v,
        Err(e) => {
            result_error(ctx, &format!("knn_param: {e}"));
            return;
        }
    };

    let k_raw = ffi::sqlite3_value_int64(args[1]);
    if k_raw <= 0 {
        result_error(ctx, "knn_param: k must be > 0");
        return;
    }

    let param = Box::new(KnnParam {
        query_vector,
        k: k_raw as u32,
    });
    let ptr = Box::into_raw(param) as *mut c_void;
    ffi::sqlite3_result_pointer(ctx, ptr, KNN_PARAM_TAG.as_ptr(), Some(destroy_knn_param));
}

unsafe extern "C" fn destroy_knn_param(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr as *mut KnnParam));
    }
}

/// The marker function `knn_search(col, param)` is never actually evaluated
/// on the hot path: `BestIndex` recognizes its constraint form and `Filter`
/// consumes the parameter directly, omitting the constraint from normal
/// WHERE-clause evaluation. This body only runs if SQLite falls back to
/// evaluating it as an ordinary scalar function (e.g. outside a WHERE
/// clause), in which case it is a no-op returning NULL.
unsafe extern "C" fn knn_search_marker_fn(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    _argv: *mut *mut ffi::sqlite3_value,
) {
    ffi::sqlite3_result_null(ctx);
}

unsafe fn result_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    ffi::sqlite3_result_error(
        ctx,
        message.as_ptr() as *const std::os::raw::c_char,
        message.len() as c_int,
    );
}

/// Extract a `&KnnParam` from a raw argument value, tagged
/// `vector_search_knn_param`. Returns `None` if the pointer is null or
/// tagged with any other discriminator — SQLite itself enforces the tag
/// comparison inside `sqlite3_value_pointer`.
///
/// # Safety
/// `value` must be a valid `sqlite3_value*` for the duration of the call,
/// as guaranteed by the vtab `Filter` callback that hands it to us.
pub unsafe fn extract<'a>(value: *mut ffi::sqlite3_value) -> Option<&'a KnnParam> {
    let ptr = ffi::sqlite3_value_pointer(value, KNN_PARAM_TAG.as_ptr()) as *mut KnnParam;
    ptr.as_ref()
}
