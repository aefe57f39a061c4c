// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use clap::Parser;
use log::*;
use std::process;
use tpm_pubhash::tpm::{Context, OpenConfig};

/// Print the SHA-256 fingerprint of the TPM Endorsement Key public key.
///
/// The fingerprint is the lowercase hex SHA-256 digest of the DER encoded
/// SubjectPublicKeyInfo from the first EK certificate holding an RSA key.
#[derive(Parser)]
#[command(about, version)]
struct Args {
    /// Increase log verbosity on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    pretty_env_logger::formatted_builder()
        .filter_level(log_level)
        .target(pretty_env_logger::env_logger::Target::Stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = OpenConfig::from_env();
    match tpm_pubhash::run(&config, Context::open) {
        Ok(pubhash) => println!("{pubhash}"),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
