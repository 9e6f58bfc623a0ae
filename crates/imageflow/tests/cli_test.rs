#![allow(deprecated)] // TODO: move cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

/// A command isolated from the caller's IMAGEFLOW_* environment
fn imageflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("imageflow").unwrap();
    cmd.current_dir(dir);
    for var in [
        "IMAGEFLOW_PROJECT_ROOT",
        "IMAGEFLOW_PACKER",
        "IMAGEFLOW_QEMU_IMG",
        "IMAGEFLOW_BUCKET",
        "IMAGEFLOW_COMPARTMENT",
        "IMAGEFLOW_REGION",
        "IMAGEFLOW_CREDENTIALS",
        "IMAGEFLOW_PROFILE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Project using the default layout: packer/ with both templates
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let packer = dir.path().join("packer");
    fs::create_dir_all(&packer).unwrap();
    fs::write(packer.join("base-hardened.pkr.hcl"), "source \"qemu\" \"base\" {}").unwrap();
    fs::write(packer.join("proxmox-ampere.pkr.hcl"), "source \"qemu\" \"pve\" {}").unwrap();
    dir
}

/// Executable shell script standing in for an external tool
#[cfg(unix)]
fn script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// packer logging its arguments and writing `output-qemu/<template stem>.qcow2`
#[cfg(unix)]
fn fake_tools(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let tools = dir.join("tools");
    fs::create_dir_all(&tools).unwrap();
    let packer = tools.join("packer");
    script(
        &packer,
        &format!(
            r#"echo "$@" >> "{}"
if [ "$1" = build ]; then
  for arg; do template=$arg; done
  mkdir -p output-qemu
  printf qcow > "output-qemu/${{template%.pkr.hcl}}.qcow2"
fi"#,
            tools.join("packer.log").display()
        ),
    );
    let qemu_img = tools.join("qemu-img");
    script(&qemu_img, r#"echo '{"virtual-size": 1073741824}'"#);
    (packer, qemu_img)
}

fn export(root: &Path, name: &str) {
    let dir = root.join("artifacts").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.qcow2", name)), name).unwrap();
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    imageflow(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build-base"))
        .stdout(predicate::str::contains("build-derived"))
        .stdout(predicate::str::contains("build-all"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("upload"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    imageflow(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("imageflow"));
}

#[test]
fn test_upload_help() {
    let dir = tempfile::tempdir().unwrap();
    imageflow(dir.path())
        .args(["upload", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bucket"))
        .stdout(predicate::str::contains("--compartment"))
        .stdout(predicate::str::contains("--credentials"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_invalid_command() {
    let dir = tempfile::tempdir().unwrap();
    imageflow(dir.path()).arg("invalid-command").assert().failure();
}

#[test]
fn test_validate_without_project() {
    let dir = tempfile::tempdir().unwrap();
    imageflow(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ configuration error"));
}

#[test]
fn test_validate_without_artifacts() {
    let dir = project();
    imageflow(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ size validation failed"))
        .stderr(predicate::str::contains("base-hardened"));
}

#[test]
fn test_build_derived_without_base() {
    let dir = project();
    imageflow(dir.path())
        .arg("build-derived")
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ derived image build failed"))
        .stderr(predicate::str::contains("imageflow build-base"));
    assert!(!dir.path().join("artifacts/proxmox-ampere").exists());
}

#[test]
fn test_build_base_without_packer() {
    let dir = project();
    imageflow(dir.path())
        .args(["build-base", "--packer", "/nonexistent/packer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ base image build failed"));
    assert!(!dir.path().join("artifacts/base-hardened").exists());
}

#[test]
fn test_build_base_without_definitions() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("packer")).unwrap();
    imageflow(dir.path())
        .arg("build-base")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no build definitions"));
}

#[test]
fn test_upload_dry_run() {
    let dir = project();
    export(dir.path(), "base-hardened");
    export(dir.path(), "proxmox-ampere");

    imageflow(dir.path())
        .args([
            "upload",
            "--dry-run",
            "--bucket",
            "images",
            "--compartment",
            "ocid1.compartment.oc1..test",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("uploaded base-hardened"))
        .stdout(predicate::str::contains("quota verified"))
        .stdout(predicate::str::contains("registered proxmox-ampere"));
}

#[test]
fn test_upload_without_bucket() {
    let dir = project();
    imageflow(dir.path())
        .args(["upload", "--dry-run", "--compartment", "ocid1.compartment.oc1..test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing publish setting 'bucket'"));
}

#[test]
fn test_upload_with_missing_credentials() {
    let dir = project();
    export(dir.path(), "base-hardened");
    export(dir.path(), "proxmox-ampere");

    imageflow(dir.path())
        .args([
            "upload",
            "--bucket",
            "images",
            "--compartment",
            "ocid1.compartment.oc1..test",
            "--credentials",
        ])
        .arg(dir.path().join("no-such-bundle"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ upload failed"))
        .stderr(predicate::str::contains("credential bundle"));
}

#[test]
fn test_project_file_settings() {
    let dir = project();
    fs::write(
        dir.path().join("imageflow.kdl"),
        r#"
project "oci-free-tier"
publish {
    bucket "from-config"
    compartment "ocid1.compartment.oc1..config"
}
"#,
    )
    .unwrap();
    export(dir.path(), "base-hardened");
    export(dir.path(), "proxmox-ampere");

    imageflow(dir.path())
        .args(["upload", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-config"));
}

#[cfg(unix)]
#[test]
fn test_run_without_bucket_builds_nothing() {
    let dir = project();
    let (packer, qemu_img) = fake_tools(dir.path());

    imageflow(dir.path())
        .arg("run")
        .arg("--packer")
        .arg(&packer)
        .arg("--qemu-img")
        .arg(&qemu_img)
        .args(["--compartment", "ocid1.compartment.oc1..test", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing publish setting 'bucket'"));
    assert!(!dir.path().join("tools/packer.log").exists());
    assert!(!dir.path().join("artifacts").exists());
}

#[cfg(unix)]
#[test]
fn test_run_with_bad_credentials_builds_nothing() {
    let dir = project();
    let (packer, qemu_img) = fake_tools(dir.path());

    imageflow(dir.path())
        .arg("run")
        .arg("--packer")
        .arg(&packer)
        .arg("--qemu-img")
        .arg(&qemu_img)
        .args(["--bucket", "images", "--compartment", "ocid1.compartment.oc1..test"])
        .arg("--credentials")
        .arg(dir.path().join("no-such-bundle"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ upload failed"));
    assert!(!dir.path().join("tools/packer.log").exists());
}

#[cfg(unix)]
#[test]
fn test_run_dry_run_prints_stage_trace() {
    let dir = project();
    let (packer, qemu_img) = fake_tools(dir.path());

    imageflow(dir.path())
        .arg("run")
        .arg("--packer")
        .arg(&packer)
        .arg("--qemu-img")
        .arg(&qemu_img)
        .args([
            "--bucket",
            "images",
            "--compartment",
            "ocid1.compartment.oc1..test",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Pipeline complete!"))
        .stdout(predicate::str::contains("Stages:"))
        .stdout(predicate::str::contains("base image build"))
        .stdout(predicate::str::contains("derived image build"))
        .stdout(predicate::str::contains("size validation"))
        .stdout(predicate::str::contains("2 images registered"));

    let log = fs::read_to_string(dir.path().join("tools/packer.log")).unwrap();
    assert!(log.contains("base-hardened.pkr.hcl"));
    assert!(log.contains("proxmox-ampere.pkr.hcl"));
    assert!(dir.path().join("artifacts/proxmox-ampere/proxmox-ampere.qcow2").is_file());
}
