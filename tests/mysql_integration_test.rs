// ABOUTME: Integration tests against two live MySQL databases
// ABOUTME: Run with TEST_MYSQL_* set and `cargo test -- --ignored`

use db_replicate::config::DbConfig;
use db_replicate::sync::{self, SyncOptions, TableOutcome};
use db_replicate::{database, SyncError};
use mysql_async::prelude::*;
use std::env;
use std::time::Duration;

/// Source and target configs from the environment.
///
/// TEST_MYSQL_HOST, TEST_MYSQL_PORT (default 3306), TEST_MYSQL_USER,
/// TEST_MYSQL_PASSWORD, TEST_MYSQL_SOURCE_DB, TEST_MYSQL_TARGET_DB
fn get_test_configs() -> Option<(DbConfig, DbConfig)> {
    let host = env::var("TEST_MYSQL_HOST").ok()?;
    let port = env::var("TEST_MYSQL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3306);
    let user = env::var("TEST_MYSQL_USER").ok()?;
    let password = env::var("TEST_MYSQL_PASSWORD").unwrap_or_default();
    let make = |db: String| DbConfig {
        driver: "mysql".to_string(),
        host: host.clone(),
        port,
        db_name: db,
        charset: "utf8mb4".to_string(),
        user_name: user.clone(),
        password: password.clone(),
    };
    Some((
        make(env::var("TEST_MYSQL_SOURCE_DB").ok()?),
        make(env::var("TEST_MYSQL_TARGET_DB").ok()?),
    ))
}

async fn raw_conn(config: &DbConfig) -> mysql_async::Conn {
    let opts = mysql_async::OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .db_name(Some(config.db_name.clone()))
        .user(Some(config.user_name.clone()))
        .pass(Some(config.password.clone()));
    mysql_async::Conn::new(opts)
        .await
        .expect("Failed to connect for setup")
}

/// Drop every table so the gate only sees what a test creates.
async fn reset(conn: &mut mysql_async::Conn) {
    let tables: Vec<String> = conn.query("SHOW TABLES").await.unwrap();
    for table in tables {
        conn.query_drop(format!("DROP TABLE `{}`", table))
            .await
            .unwrap();
    }
}

async fn create_users(conn: &mut mysql_async::Conn, rows: u32) {
    conn.query_drop(
        "CREATE TABLE users (
            id INT PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            balance DECIMAL(10,2),
            created_at DATETIME
        )",
    )
    .await
    .unwrap();
    for id in 1..=rows {
        conn.exec_drop(
            "INSERT INTO users (id, name, balance, created_at) VALUES (?, ?, ?, NOW())",
            (id, format!("user-{}", id), format!("{}.25", id)),
        )
        .await
        .unwrap();
    }
}

async fn count(conn: &mut mysql_async::Conn, table: &str) -> u64 {
    conn.query_first(format!("SELECT COUNT(*) FROM `{}`", table))
        .await
        .unwrap()
        .unwrap()
}

/// Test: missing rows are copied in one bounded batch per run
#[tokio::test]
#[ignore]
async fn test_catch_up_in_bounded_batches() {
    let (source_cfg, target_cfg) =
        get_test_configs().expect("TEST_MYSQL_* environment variables must be set");

    let mut source_raw = raw_conn(&source_cfg).await;
    let mut target_raw = raw_conn(&target_cfg).await;
    reset(&mut source_raw).await;
    reset(&mut target_raw).await;
    create_users(&mut source_raw, 25).await;
    create_users(&mut target_raw, 0).await;

    let timeout = Duration::from_secs(5);
    let mut source = database::connect("source", &source_cfg, timeout, 0)
        .await
        .unwrap();
    let mut target = database::connect("target", &target_cfg, timeout, 0)
        .await
        .unwrap();

    let options = SyncOptions {
        max_rows: 10,
        order_by_primary_key: true,
        dry_run: false,
    };

    let summary = sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .unwrap();
    assert_eq!(summary.total_inserted(), 10);
    assert_eq!(count(&mut target_raw, "users").await, 10);

    sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .unwrap();
    let summary = sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .unwrap();
    assert_eq!(summary.total_inserted(), 5);
    assert_eq!(count(&mut target_raw, "users").await, 25);

    let summary = sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .unwrap();
    assert_eq!(summary.tables[0].outcome, TableOutcome::InSync { rows: 25 });

    // Values survive the round trip
    let copied: Option<(String, String)> = target_raw
        .query_first("SELECT name, CAST(balance AS CHAR) FROM users WHERE id = 17")
        .await
        .unwrap();
    assert_eq!(
        copied,
        Some(("user-17".to_string(), "17.25".to_string()))
    );
}

/// Test: duplicate keys are reported per row and the batch continues
#[tokio::test]
#[ignore]
async fn test_duplicate_rows_are_isolated() {
    let (source_cfg, target_cfg) =
        get_test_configs().expect("TEST_MYSQL_* environment variables must be set");

    let mut source_raw = raw_conn(&source_cfg).await;
    let mut target_raw = raw_conn(&target_cfg).await;
    reset(&mut source_raw).await;
    reset(&mut target_raw).await;
    create_users(&mut source_raw, 6).await;
    create_users(&mut target_raw, 2).await;
    // Row 4 already present: the window starting at offset 3 hits it
    target_raw
        .exec_drop(
            "INSERT INTO users (id, name) VALUES (?, ?)",
            (4, "user-4"),
        )
        .await
        .unwrap();

    let timeout = Duration::from_secs(5);
    let mut source = database::connect("source", &source_cfg, timeout, 0)
        .await
        .unwrap();
    let mut target = database::connect("target", &target_cfg, timeout, 0)
        .await
        .unwrap();

    let options = SyncOptions {
        max_rows: 100,
        order_by_primary_key: true,
        dry_run: false,
    };
    let summary = sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .unwrap();

    // Offset 3 -> ids 4 (duplicate), 5, 6
    assert_eq!(summary.total_inserted(), 2);
    assert_eq!(summary.total_failed(), 1);
    assert_eq!(count(&mut target_raw, "users").await, 5);
}

/// Test: a table missing from the target stops the run before any copy
#[tokio::test]
#[ignore]
async fn test_missing_target_table_halts() {
    let (source_cfg, target_cfg) =
        get_test_configs().expect("TEST_MYSQL_* environment variables must be set");

    let mut source_raw = raw_conn(&source_cfg).await;
    let mut target_raw = raw_conn(&target_cfg).await;
    reset(&mut source_raw).await;
    reset(&mut target_raw).await;
    create_users(&mut source_raw, 3).await;
    create_users(&mut target_raw, 0).await;
    source_raw
        .query_drop("CREATE TABLE audit_log (id INT PRIMARY KEY, entry TEXT)")
        .await
        .unwrap();

    let timeout = Duration::from_secs(5);
    let mut source = database::connect("source", &source_cfg, timeout, 0)
        .await
        .unwrap();
    let mut target = database::connect("target", &target_cfg, timeout, 0)
        .await
        .unwrap();

    let err = sync::run(source.as_mut(), target.as_mut(), &SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<SyncError>(),
        Some(&SyncError::MissingTables(vec!["audit_log".to_string()]))
    );
    assert_eq!(count(&mut target_raw, "users").await, 0);
}
