use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn missing_image_fails_and_writes_no_reports() {
    let output = tempdir().unwrap();
    let missing_image = output.path().join("nonexistent.raw");
    let out_dir = output.path().join("analysis_output");

    let mut cmd = Command::cargo_bin("memforensics").unwrap();
    cmd.arg("-f")
        .arg(&missing_image)
        .arg("-o")
        .arg(&out_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("memory image not found"));

    assert!(!out_dir.join("memory_report.json").exists());
}

#[test]
fn list_plugins_prints_the_catalogue_without_requiring_an_image() {
    let mut cmd = Command::cargo_bin("memforensics").unwrap();
    cmd.arg("-f")
        .arg("unused.raw")
        .arg("--list-plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("windows.pslist.PsList"))
        .stdout(predicate::str::contains("windows.registry.printkey.PrintKey"));
}
