//! Integration tests against a live Oracle database.
//!
//! Run with: cargo test --test live
//!
//! These tests skip themselves when no database is reachable. Configure the
//! target via tests/.env or the environment:
//! ORATHIN_HOST, ORATHIN_PORT, ORATHIN_SERVICE, ORATHIN_USERNAME,
//! ORATHIN_PASSWORD.

use orathin::{Connection, ExecuteManyOptions, OracleValue};
use std::env;

fn load_env() {
    let _ = dotenvy::from_path("tests/.env");
}

fn get_conn_str() -> Option<String> {
    load_env();
    let host = env::var("ORATHIN_HOST").ok()?;
    let port = env::var("ORATHIN_PORT").unwrap_or_else(|_| "1521".to_string());
    let service = env::var("ORATHIN_SERVICE").unwrap_or_else(|_| "FREEPDB1".to_string());
    Some(format!("{}:{}/{}", host, port, service))
}

fn get_username() -> String {
    load_env();
    env::var("ORATHIN_USERNAME").unwrap_or_else(|_| "system".to_string())
}

fn get_password() -> Option<String> {
    load_env();
    env::var("ORATHIN_PASSWORD").ok()
}

/// Connect, or skip the test when no database is configured or reachable.
macro_rules! connect_or_skip {
    () => {{
        let (Some(conn_str), Some(password)) = (get_conn_str(), get_password()) else {
            eprintln!("skipping - no database configured");
            return;
        };
        match Connection::connect(&conn_str, &get_username(), &password).await {
            Ok(conn) => conn,
            Err(e) => {
                let text = e.to_string();
                if text.contains("Connection refused")
                    || text.contains("I/O error")
                    || text.contains("timed out")
                {
                    eprintln!("skipping - database not reachable: {}", e);
                    return;
                }
                panic!("unexpected connection error: {}", e);
            }
        }
    }};
}

#[tokio::test]
async fn test_connect_and_ping() {
    let conn = connect_or_skip!();
    conn.ping().await.unwrap();
    if let Some(version) = conn.server_version() {
        println!(
            "connected to Oracle {}.{}.{}.{}.{}",
            version.0, version.1, version.2, version.3, version.4
        );
    }
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_select_dual() {
    let conn = connect_or_skip!();
    let mut cursor = conn.cursor();
    cursor.execute("SELECT 1 FROM DUAL", &[]).await.unwrap();

    let description = cursor.description().unwrap();
    assert_eq!(description[0].name, "1");

    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0).unwrap().to_i64(), Some(1));
    assert!(cursor.fetchone().await.unwrap().is_none());

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_bind_round_trip() {
    let conn = connect_or_skip!();
    let mut cursor = conn.cursor();
    cursor
        .execute(
            "SELECT :1 || '-' || :2 FROM DUAL",
            &[OracleValue::from("left"), OracleValue::from("right")],
        )
        .await
        .unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0).unwrap().as_str(), Some("left-right"));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_fetch_many_rows() {
    let conn = connect_or_skip!();
    let mut cursor = conn.cursor();
    cursor.arraysize = 10;
    cursor.prefetchrows = 10;
    cursor
        .execute("SELECT level FROM DUAL CONNECT BY level <= 100", &[])
        .await
        .unwrap();
    let rows = cursor.fetchall().await.unwrap();
    assert_eq!(rows.len(), 100);
    assert_eq!(rows[99].get(0).unwrap().to_i64(), Some(100));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_executemany_and_batch_errors() {
    let conn = connect_or_skip!();
    let mut cursor = conn.cursor();

    let _ = cursor.execute("DROP TABLE orathin_batch_test", &[]).await;
    cursor
        .execute(
            "CREATE TABLE orathin_batch_test (pk NUMBER PRIMARY KEY, val VARCHAR2(10))",
            &[],
        )
        .await
        .unwrap();

    let rows = vec![
        vec![OracleValue::Integer(70), OracleValue::from("A")],
        vec![OracleValue::Integer(70), OracleValue::from("B")],
        vec![OracleValue::Integer(80), OracleValue::from("C")],
    ];
    cursor
        .executemany(
            "INSERT INTO orathin_batch_test VALUES (:1, :2)",
            rows,
            ExecuteManyOptions {
                batch_errors: true,
                array_dml_row_counts: false,
            },
        )
        .await
        .unwrap();

    let errors = cursor.getbatcherrors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].offset, 1);
    assert_eq!(errors[0].code, 1);

    conn.rollback().await.unwrap();
    let _ = cursor.execute("DROP TABLE orathin_batch_test", &[]).await;
    conn.close().await.unwrap();
}
