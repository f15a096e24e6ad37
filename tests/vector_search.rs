//! ABOUTME: Black-box end-to-end tests driving the vector_search virtual
//! ABOUTME: table through real SQL, mirroring the scenarios in spec §8.

use rusqlite::{params, Connection};
use vectorlite::Vector;

fn open() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    vectorlite::register(&conn).unwrap();
    conn
}

fn blob(values: &[f32]) -> Vec<u8> {
    Vector::new(values.to_vec()).to_blob()
}

fn create_table(conn: &Connection, dim: usize, distance_type: &str, max_elements: usize) {
    conn.execute(
        &format!(
            "CREATE VIRTUAL TABLE t USING vector_search(\
                '{{\"name\":\"v\",\"dim\":{dim},\"distance_type\":\"{distance_type}\"}}', \
                '{{\"max_elements\":{max_elements}}}')"
        ),
        [],
    )
    .unwrap();
}

#[test]
fn reports_itself_in_the_module_list() {
    let conn = open();
    let found: bool = conn
        .query_row(
            "SELECT 1 FROM pragma_module_list WHERE name = 'vector_search'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    assert!(found, "vector_search module not found in pragma_module_list");
}

#[test]
fn basic_knn_scenario() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();
    conn.execute("INSERT INTO t(rowid, v) VALUES (2, ?1)", [blob(&[0.0, 1.0])])
        .unwrap();
    conn.execute("INSERT INTO t(rowid, v) VALUES (3, ?1)", [blob(&[1.0, 1.0])])
        .unwrap();

    let mut stmt = conn
        .prepare(
            "SELECT rowid, distance FROM t \
             WHERE knn_search(v, knn_param(?1, ?2)) ORDER BY distance",
        )
        .unwrap();
    let rows: Vec<(i64, f64)> = stmt
        .query_map(params![blob(&[0.9, 0.1]), 2], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, 1);
    assert_eq!(rows[1].0, 3);
    assert!(rows[0].1 <= rows[1].1);
    assert!((rows[0].1 - 0.02).abs() < 0.01);
}

#[test]
fn dimension_mismatch_query_errors_with_no_rows() {
    let conn = open();
    create_table(&conn, 3, "l2", 100);

    let err = conn
        .prepare("SELECT rowid FROM t WHERE knn_search(v, knn_param(?1, ?2))")
        .unwrap()
        .query_map(params![blob(&[1.0, 2.0]), 1], |row| row.get::<_, i64>(0))
        .unwrap()
        .next()
        .unwrap();
    assert!(err.is_err());
}

#[test]
fn cosine_equivalence_scenario() {
    let conn = open();
    create_table(&conn, 2, "cosine", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[2.0, 0.0])])
        .unwrap();
    conn.execute("INSERT INTO t(rowid, v) VALUES (2, ?1)", [blob(&[0.0, 5.0])])
        .unwrap();

    let mut stmt = conn
        .prepare(
            "SELECT rowid, distance FROM t \
             WHERE knn_search(v, knn_param(?1, ?2)) ORDER BY distance",
        )
        .unwrap();
    let rows: Vec<(i64, f64)> = stmt
        .query_map(params![blob(&[1.0, 0.0]), 2], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows[0].0, 1);
    assert!(rows[0].1.abs() < 1e-4);
    assert_eq!(rows[1].0, 2);
}

#[test]
fn bad_blob_insert_is_rejected_and_size_unchanged() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    let result = conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [vec![0u8; 7]]);
    assert!(result.is_err());

    let count: i64 = conn
        .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn non_integer_rowid_insert_is_rejected() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    let result = conn.execute(
        "INSERT INTO t(rowid, v) VALUES ('oops', ?1)",
        [blob(&[1.0, 0.0])],
    );
    assert!(result.is_err());

    let count: i64 = conn
        .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn non_blob_column_value_insert_is_rejected() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    let result = conn.execute("INSERT INTO t(rowid, v) VALUES (1, 42)", []);
    assert!(result.is_err());
}

#[test]
fn knn_param_rejects_non_blob_query_vector() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();

    let result = conn
        .prepare("SELECT rowid FROM t WHERE knn_search(v, knn_param('abcd', 1))")
        .unwrap()
        .query_map([], |row| row.get::<_, i64>(0))
        .unwrap()
        .next();
    assert!(result.map_or(true, |r| r.is_err()));
}

#[test]
fn knn_param_rejects_non_integer_k() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();

    let result = conn
        .prepare("SELECT rowid FROM t WHERE knn_search(v, knn_param(?1, 'x'))")
        .unwrap()
        .query_map(params![blob(&[1.0, 0.0])], |row| row.get::<_, i64>(0))
        .unwrap()
        .next();
    assert!(result.map_or(true, |r| r.is_err()));
}

#[test]
fn capacity_exceeded_on_third_insert() {
    let conn = open();
    create_table(&conn, 2, "l2", 2);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();
    conn.execute("INSERT INTO t(rowid, v) VALUES (2, ?1)", [blob(&[0.0, 1.0])])
        .unwrap();
    let result = conn.execute("INSERT INTO t(rowid, v) VALUES (3, ?1)", [blob(&[1.0, 1.0])]);
    assert!(result.is_err());
}

#[test]
fn raw_integer_param_is_rejected_as_tag_mismatch() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();

    let result = conn
        .prepare("SELECT rowid FROM t WHERE knn_search(v, 42)")
        .unwrap()
        .query_map([], |row| row.get::<_, i64>(0))
        .unwrap()
        .next();
    assert!(result.map_or(true, |r| r.is_err()));
}

#[test]
fn column_fetch_roundtrips_inserted_vector() {
    let conn = open();
    create_table(&conn, 3, "l2", 100);
    conn.execute(
        "INSERT INTO t(rowid, v) VALUES (1, ?1)",
        [blob(&[1.0, 2.0, 3.0])],
    )
    .unwrap();

    let mut stmt = conn
        .prepare(
            "SELECT v FROM t WHERE knn_search(v, knn_param(?1, ?2))",
        )
        .unwrap();
    let fetched: Vec<u8> = stmt
        .query_row(params![blob(&[1.0, 2.0, 3.0]), 1], |row| row.get(0))
        .unwrap();
    assert_eq!(fetched.len(), 12);
    assert_eq!(fetched, blob(&[1.0, 2.0, 3.0]));
}

#[test]
fn duplicate_rowid_is_rejected() {
    let conn = open();
    create_table(&conn, 2, "l2", 100);
    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();
    let result = conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[0.0, 1.0])]);
    assert!(result.is_err());
}

#[test]
fn works_against_a_file_backed_connection() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vectorlite_test.sqlite3");
    let conn = Connection::open(&db_path).unwrap();
    vectorlite::register(&conn).unwrap();
    create_table(&conn, 2, "l2", 10);

    conn.execute("INSERT INTO t(rowid, v) VALUES (1, ?1)", [blob(&[1.0, 0.0])])
        .unwrap();

    let rowid: i64 = conn
        .query_row(
            "SELECT rowid FROM t WHERE knn_search(v, knn_param(?1, ?2))",
            params![blob(&[1.0, 0.0]), 1],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rowid, 1);
}

#[test]
fn distance_is_non_decreasing_over_a_random_dataset() {
    use rand::Rng;

    let conn = open();
    create_table(&conn, 8, "l2", 500);
    let mut rng = rand::thread_rng();

    for rowid in 0..200i64 {
        let v: Vec<f32> = (0..8).map(|_| rng.gen_range(-10.0..10.0)).collect();
        conn.execute(
            "INSERT INTO t(rowid, v) VALUES (?1, ?2)",
            params![rowid, blob(&v)],
        )
        .unwrap();
    }

    let query: Vec<f32> = (0..8).map(|_| rng.gen_range(-10.0..10.0)).collect();
    let mut stmt = conn
        .prepare(
            "SELECT rowid, distance FROM t \
             WHERE knn_search(v, knn_param(?1, ?2)) ORDER BY distance",
        )
        .unwrap();
    let rows: Vec<(i64, f64)> = stmt
        .query_map(params![blob(&query), 20], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(rows.len() <= 20);
    for pair in rows.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "distances must be non-decreasing");
    }
}
