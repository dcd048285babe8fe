//! End-to-end gateway workflows against every backend in this crate.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeSet;
use std::path::Path;

use tempfile::TempDir;
use tsbench_core::backend::dataset::DatasetBackend;
use tsbench_core::backend::parquet::{ParquetBackend, ParquetConfig};
use tsbench_core::backend::session::memory::{MemorySession, MemoryStore};
use tsbench_core::backend::session::{RemoteBackend, SessionEndpoint};
use tsbench_core::config::{BUFFER_POINTS, SCAN_ALL};
use tsbench_core::{
    Backend, FieldMap, Gateway, GatewayConfig, PayloadLayout, Properties, Status,
};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

fn session_gateway(config: GatewayConfig) -> TestResult<(Gateway, MemoryStore)> {
    let session = MemorySession::new();
    let store = session.store();
    let backend = RemoteBackend::connect(session, &SessionEndpoint::default())?;
    Ok((Gateway::new(Box::new(backend), config), store))
}

fn file_config(path: &Path) -> ParquetConfig {
    ParquetConfig {
        table: "t".to_string(),
        field_count: 2,
        field_prefix: "f".to_string(),
        ..ParquetConfig::default()
    }
    .with_path(path)
}

/// Insert the two example rows and scan `[100, 102)`.
fn example_round_trip(gw: &mut Gateway) -> TestResult {
    assert_eq!(gw.insert("t", "user100", &fields(&[("f0", "x"), ("f1", "y")])), Status::Ok);
    assert_eq!(gw.insert("t", "user101", &fields(&[("f0", "z")])), Status::Ok);
    Ok(())
}

fn assert_example_scan(gw: &mut Gateway) {
    let mut rows = Vec::new();
    assert_eq!(gw.scan("t", "user100", 2, None, &mut rows), Status::Ok);
    assert_eq!(
        rows,
        vec![fields(&[("f0", "x"), ("f1", "y")]), fields(&[("f0", "z")])]
    );
}

#[test]
fn buffered_example_rows_scan_back_through_session() -> TestResult {
    let (mut gw, store) = session_gateway(GatewayConfig {
        buffer_points: 10,
        ..GatewayConfig::default()
    })?;
    example_round_trip(&mut gw)?;
    assert_eq!(gw.buffered_points(), 3);
    assert_eq!(store.insert_calls(), 0);

    assert_eq!(gw.flush(), Status::Ok);
    assert_example_scan(&mut gw);
    Ok(())
}

#[test]
fn unbuffered_mode_flushes_each_insert_alone() -> TestResult {
    let (mut gw, store) = session_gateway(GatewayConfig::default())?;
    example_round_trip(&mut gw)?;

    assert_eq!(gw.buffered_points(), 0);
    assert_eq!(store.insert_calls(), 2);
    assert_example_scan(&mut gw);
    Ok(())
}

#[test]
fn column_major_flush_is_equivalent() -> TestResult {
    let (mut gw, _) = session_gateway(GatewayConfig {
        buffer_points: 3,
        layout: PayloadLayout::ColumnMajor,
        ..GatewayConfig::default()
    })?;
    example_round_trip(&mut gw)?;
    assert_example_scan(&mut gw);
    Ok(())
}

#[test]
fn window_bounds_are_half_open() -> TestResult {
    let (mut gw, _) = session_gateway(GatewayConfig::default())?;
    for k in [99, 100, 101, 102] {
        gw.insert("t", &format!("user{k}"), &fields(&[("f0", "v")]));
    }

    let mut rows = Vec::new();
    assert_eq!(gw.scan("t", "user100", 2, None, &mut rows), Status::Ok);
    assert_eq!(rows.len(), 2);

    // zero record count reads exactly one key
    assert_eq!(gw.scan("t", "user102", 0, None, &mut rows), Status::Ok);
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn read_returns_single_row_or_not_found() -> TestResult {
    let (mut gw, _) = session_gateway(GatewayConfig::default())?;
    example_round_trip(&mut gw)?;

    let mut row = FieldMap::new();
    assert_eq!(gw.read("t", "user101", None, &mut row), Status::Ok);
    assert_eq!(row, fields(&[("f0", "z")]));

    assert_eq!(gw.read("t", "user102", None, &mut row), Status::NotFound);
    Ok(())
}

#[test]
fn projection_is_not_implemented_everywhere() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("p.parquet");
    let projection: BTreeSet<String> = ["f0".to_string()].into_iter().collect();

    let (session_gw, _) = session_gateway(GatewayConfig::default())?;
    let mut gateways = vec![
        session_gw,
        Gateway::new(
            Box::new(ParquetBackend::new(file_config(&path))),
            GatewayConfig::default(),
        ),
        Gateway::new(
            Box::new(DatasetBackend::new(file_config(&path), 16)),
            GatewayConfig::default(),
        ),
    ];

    for gw in &mut gateways {
        let mut rows = Vec::new();
        assert_eq!(
            gw.scan("t", "user0", 10, Some(&projection), &mut rows),
            Status::NotImplemented,
            "backend {}",
            gw.backend_name()
        );
        assert!(rows.is_empty());

        let mut row = FieldMap::new();
        assert_eq!(
            gw.read("t", "user0", Some(&projection), &mut row),
            Status::NotImplemented
        );
    }
    Ok(())
}

#[test]
fn empty_store_scan_is_not_found() -> TestResult {
    let (mut gw, _) = session_gateway(GatewayConfig::default())?;
    let mut rows = Vec::new();
    assert_eq!(gw.scan("t", "user0", 100, None, &mut rows), Status::NotFound);
    Ok(())
}

#[test]
fn table_without_data_is_not_found_on_every_backend() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("one.parquet");

    let mut loader = Gateway::new(
        Box::new(ParquetBackend::new(file_config(&path))),
        GatewayConfig::default(),
    );
    assert_eq!(loader.insert("t", "user1", &fields(&[("f0", "x")])), Status::Ok);
    assert_eq!(loader.cleanup(), Status::Ok);

    let (mut session_gw, _) = session_gateway(GatewayConfig::default())?;
    assert_eq!(session_gw.insert("t", "user1", &fields(&[("f0", "x")])), Status::Ok);

    let mut gateways = vec![
        session_gw,
        Gateway::new(
            Box::new(ParquetBackend::new(file_config(&path))),
            GatewayConfig::default(),
        ),
        Gateway::new(
            Box::new(DatasetBackend::new(file_config(&path), 16)),
            GatewayConfig::default(),
        ),
    ];

    for gw in &mut gateways {
        let name = gw.backend_name();
        let mut rows = Vec::new();
        assert_eq!(gw.scan("other", "user1", 1, None, &mut rows), Status::NotFound, "{name}");
        assert!(rows.is_empty());

        let mut row = fields(&[("keep", "me")]);
        assert_eq!(gw.read("other", "user1", None, &mut row), Status::NotFound, "{name}");
        assert_eq!(row, fields(&[("keep", "me")]));

        assert_eq!(gw.read("t", "user1", None, &mut row), Status::Ok, "{name}");
        assert_eq!(row, fields(&[("f0", "x")]));
    }
    Ok(())
}

#[test]
fn scan_all_ignores_requested_window() -> TestResult {
    let props = Properties::new().with(SCAN_ALL, "true");
    let session = MemorySession::new();
    let backend = RemoteBackend::connect(session, &SessionEndpoint::default())?;
    let mut gw = Gateway::from_properties(Box::new(backend), &props)?;

    for k in [1, 500, 90_000] {
        gw.insert("t", &format!("user{k}"), &fields(&[("f0", "v")]));
    }
    let mut rows = Vec::new();
    assert_eq!(gw.scan("t", "user7", 1, None, &mut rows), Status::Ok);
    assert_eq!(rows.len(), 3);
    Ok(())
}

#[test]
fn delete_support_differs_by_backend() -> TestResult {
    let (mut gw, store) = session_gateway(GatewayConfig::default())?;
    example_round_trip(&mut gw)?;
    assert_eq!(gw.delete("t", "user100"), Status::Ok);
    assert!(!store.rows().contains_key(&100));

    let dir = TempDir::new()?;
    let mut file_gw = Gateway::new(
        Box::new(ParquetBackend::new(file_config(&dir.path().join("d.parquet")))),
        GatewayConfig::default(),
    );
    assert_eq!(file_gw.delete("t", "user100"), Status::NotImplemented);
    Ok(())
}

#[test]
fn failed_flush_drops_rows_instead_of_retrying() -> TestResult {
    let (mut gw, store) = session_gateway(GatewayConfig {
        buffer_points: 2,
        ..GatewayConfig::default()
    })?;

    store.set_fail_writes(true);
    assert_eq!(gw.insert("t", "user1", &fields(&[("f0", "a"), ("f1", "b")])), Status::Error);
    assert_eq!(gw.buffered_points(), 0);

    store.set_fail_writes(false);
    assert_eq!(gw.insert("t", "user2", &fields(&[("f0", "c"), ("f1", "d")])), Status::Ok);
    assert_eq!(store.rows().keys().copied().collect::<Vec<_>>(), vec![2]);
    Ok(())
}

#[test]
fn parquet_load_then_read_back() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("load.parquet");
    let props = Properties::new().with(BUFFER_POINTS, "4");

    let mut loader = Gateway::from_properties(
        Box::new(ParquetBackend::new(file_config(&path))),
        &props,
    )?;
    for k in 0..20 {
        let value = format!("v{k}");
        let status = loader.insert("t", &format!("user{k}"), &fields(&[("f0", value.as_str())]));
        assert_eq!(status, Status::Ok);
    }
    assert!(!path.exists());
    assert_eq!(loader.cleanup(), Status::Ok);
    assert!(path.exists());

    let readers: Vec<Box<dyn Backend>> = vec![
        Box::new(ParquetBackend::new(file_config(&path))),
        Box::new(DatasetBackend::new(file_config(&path), 3)),
    ];
    for backend in readers {
        let mut gw = Gateway::new(backend, GatewayConfig::default());
        let mut rows = Vec::new();
        assert_eq!(gw.scan("t", "user5", 4, None, &mut rows), Status::Ok);
        assert_eq!(
            rows,
            (5..9)
                .map(|k| fields(&[("f0", format!("v{k}").as_str())]))
                .collect::<Vec<_>>()
        );

        let mut row = FieldMap::new();
        assert_eq!(gw.read("t", "user19", None, &mut row), Status::Ok);
        assert_eq!(gw.read("t", "user20", None, &mut row), Status::NotFound);
    }
    Ok(())
}

#[test]
fn undeclared_field_fails_cleanup() -> TestResult {
    let dir = TempDir::new()?;
    let mut gw = Gateway::new(
        Box::new(ParquetBackend::new(file_config(&dir.path().join("u.parquet")))),
        GatewayConfig::default(),
    );
    assert_eq!(gw.insert("t", "user1", &fields(&[("f9", "v")])), Status::Ok);
    assert_eq!(gw.cleanup(), Status::Error);
    Ok(())
}
