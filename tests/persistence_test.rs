#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

fn run(db_path: &std::path::Path, rows: &[&str]) -> String {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "op, merchant, reference, amount, currency, card_number, expiry_month, expiry_year").unwrap();
    for row in rows {
        writeln!(csv, "{}", row).unwrap();
    }

    let output = Command::new(cargo_bin!("cardroute"))
        .arg(csv.path())
        .arg("--db-path")
        .arg(db_path)
        .args(["--decline-rate", "0", "--failure-rate", "0"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: authorize a payment
    let stdout1 = run(&db_path, &["authorize, m-1, order-1, 100.00, USD, 4000001234567899, 12, 2099"]);
    assert!(stdout1.contains("PMT1000,m-1,order-1,AUTHORIZED"));

    // 2. Second run: the payment is still there and keeps its sequence;
    // the duplicate reference is still rejected.
    let stdout2 = run(
        &db_path,
        &[
            "authorize, m-1, order-1, 100.00, USD, 4000001234567899, 12, 2099",
            "authorize, m-1, order-2, 20.00, USD, 4000001234567899, 12, 2099",
        ],
    );
    assert!(stdout2.contains("PMT1000,m-1,order-1,AUTHORIZED"));
    assert!(stdout2.contains("PMT1001,m-1,order-2,AUTHORIZED"));
    assert_eq!(stdout2.lines().count(), 3);
}
