// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

//! Integration tests for get_tpm_pubhash failure behavior.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

/// Create a command pointed at a TPM that cannot be reached
fn get_tpm_pubhash_with_tcti(tcti: &str) -> Command {
    let mut cmd = Command::cargo_bin("get_tpm_pubhash").unwrap(); //#[allow_ci]
    cmd.env("TCTI", tcti);
    cmd
}

#[test]
fn test_missing_device_fails() {
    let tmpdir = tempfile::tempdir().unwrap(); //#[allow_ci]
    let device = tmpdir.path().join("tpm0");
    let tcti = format!("device:{}", device.display());

    get_tpm_pubhash_with_tcti(&tcti)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("TPM error"));
}

#[test]
fn test_invalid_tcti_fails() {
    get_tpm_pubhash_with_tcti("no-such-tcti:")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error parsing TCTI configuration"));
}

#[test]
fn test_help() {
    Command::cargo_bin("get_tpm_pubhash")
        .unwrap() //#[allow_ci]
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SHA-256"));
}

#[test]
fn test_rejects_positional_arguments() {
    Command::cargo_bin("get_tpm_pubhash")
        .unwrap() //#[allow_ci]
        .arg("extra")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}
