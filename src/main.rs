//! PKI Issuer - command line front end
//!
//! Issues client certificates from an easy-rsa CA, lists the CA ledger and checks
//! issued artifacts.
//!
//! # Quick Start
//!
//! ```bash
//! # Issue a certificate for `alice` with the key size of endpoint `vpn`
//! pki-issuer --config config.toml issue --endpoint vpn alice
//!
//! # Same, with the private key encrypted under $ALICE_PASS
//! pki-issuer issue --endpoint vpn --passphrase-env ALICE_PASS alice
//!
//! # Ledger contents
//! pki-issuer list --state valid
//! pki-issuer list --json
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and written to stderr, so
//! `list --json` output on stdout stays machine readable.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use pki_issuer::configs::AppConfig;
use pki_issuer::inventory::{list_certificates, CertificateRecord, CertificateState};
use pki_issuer::issuance::Issuer;
use pki_issuer::paths::{EasyRsaLayout, PathResolver};
use pki_issuer::verify::verify_issued;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Write logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key and CSR for a common name and sign it
    Issue(IssueArgs),
    /// List the certificates recorded in the CA ledger
    List(ListArgs),
    /// Check the key, CSR and certificate issued for a common name
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct IssueArgs {
    /// Endpoint whose key size to use
    #[arg(short, long)]
    endpoint: String,

    /// Environment variable holding the private key passphrase.
    /// Without it the key is written unencrypted.
    #[arg(long, value_name = "VAR")]
    passphrase_env: Option<String>,

    /// Skip checking the artifacts after issuance
    #[arg(long)]
    no_verify: bool,

    /// Common name of the certificate
    common_name: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Only show certificates in this state (valid, revoked, expired or V/R/E)
    #[arg(long)]
    state: Option<CertificateState>,

    /// Print the inventory as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Environment variable holding the private key passphrase
    #[arg(long, value_name = "VAR")]
    passphrase_env: Option<String>,

    /// Common name of the certificate
    common_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Issue(args) => issue(&config, args).await,
        Command::List(args) => list(&config, args).await,
        Command::Verify(args) => verify(&config, args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_passphrase(var: Option<&str>) -> Result<Option<SecretString>> {
    let Some(var) = var else {
        return Ok(None);
    };
    let value = std::env::var(var)
        .with_context(|| format!("Passphrase variable {} is not set", var))?;
    Ok(Some(SecretString::from(value)))
}

async fn issue(config: &AppConfig, args: IssueArgs) -> Result<()> {
    let passphrase = read_passphrase(args.passphrase_env.as_deref())?;
    let paths = Issuer::from_config(config)
        .issue(&args.endpoint, &args.common_name, passphrase.as_ref())
        .await
        .with_context(|| format!("Failed to issue certificate for {}", args.common_name))?;

    println!("✓ Certificate issued for {}", args.common_name);
    println!("  key:         {}", paths.key_path.display());
    println!("  request:     {}", paths.request_path.display());
    println!("  certificate: {}", paths.cert_path.display());

    if !args.no_verify {
        let ca_cert = config.pki.cacert_path();
        verify_issued(&paths, &args.common_name, passphrase.as_ref(), Some(&ca_cert))
            .context("Issued artifacts failed verification")?;
        println!("✓ Key, request and certificate verified");
    }
    Ok(())
}

async fn list(config: &AppConfig, args: ListArgs) -> Result<()> {
    let index = config.pki.index_path();
    let inventory = list_certificates(&index)
        .await
        .with_context(|| format!("Failed to read ledger {}", index.display()))?;

    let records: Vec<&CertificateRecord> = match args.state {
        Some(state) => inventory.by_state(state).collect(),
        None => inventory.iter().collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No certificates found.");
        return Ok(());
    }
    println!("{:<5} {:<20} {:<40} COMMON NAME", "STATE", "EXPIRES", "SERIAL");
    for record in records {
        println!(
            "{:<5} {:<20} {:<40} {}",
            record.state.code(),
            record.expires_at.format("%Y-%m-%d %H:%M:%S"),
            record.serial,
            record.common_name
        );
    }
    Ok(())
}

fn verify(config: &AppConfig, args: VerifyArgs) -> Result<()> {
    let passphrase = read_passphrase(args.passphrase_env.as_deref())?;
    let paths = EasyRsaLayout.resolve(&config.pki.root, &args.common_name)?;
    let ca_cert = config.pki.cacert_path();
    verify_issued(&paths, &args.common_name, passphrase.as_ref(), Some(&ca_cert))
        .with_context(|| format!("Verification failed for {}", args.common_name))?;
    println!("✓ Key, request and certificate verified for {}", args.common_name);
    Ok(())
}
