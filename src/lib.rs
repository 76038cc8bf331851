//! PKI Issuer - client certificates from an easy-rsa CA
//!
//! A thin control layer over an OpenSSL/easy-rsa certificate authority for small
//! private PKIs. It issues client certificates by driving the `openssl` binary and
//! reads the CA's ledger (`index.txt`) back as a certificate inventory.
//!
//! # Overview
//!
//! ```text
//! Issuer::issue ──▶ [issuance lock] ──▶ openssl req ──▶ key + CSR on disk
//!                                   └──▶ openssl ca  ──▶ certificate on disk, ledger line appended
//!
//! list_certificates ──▶ index.txt ──▶ Inventory (ledger order)
//! ```
//!
//! The `openssl` process receives exactly the `EASYRSA_*` environment the `easyrsa`
//! script would give it, so an existing easy-rsa PKI can be served without the
//! script itself.
//!
//! # Quick Start
//!
//! ```toml
//! # config.toml
//! [pki]
//! root = "/etc/openvpn/pki"
//!
//! [openssl]
//! config = "/etc/openvpn/pki/openssl-easyrsa.cnf"
//!
//! [endpoints.vpn]
//! keysize = 2048
//! ```
//!
//! ```bash
//! pki-issuer issue --endpoint vpn alice
//! pki-issuer list --state valid
//! ```
//!
//! ## As a Library
//!
//! ```no_run
//! use pki_issuer::configs::AppConfig;
//! use pki_issuer::inventory::list_certificates;
//! use pki_issuer::issuance::Issuer;
//!
//! # async fn example() -> pki_issuer::error::Result<()> {
//! let config = AppConfig::from_file("config.toml")?;
//!
//! let paths = Issuer::from_config(&config).issue("vpn", "alice", None).await?;
//! println!("key:  {}", paths.key_path.display());
//! println!("cert: {}", paths.cert_path.display());
//!
//! for record in list_certificates(&config.pki.index_path()).await?.iter() {
//!     println!("{} {} {}", record.state.code(), record.serial, record.common_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! - [`executor`]: runs the CA tool with a replaced environment, captures output
//! - [`environment`]: the `EASYRSA_*` environment and the CA binary
//! - [`paths`]: key/CSR/certificate locations inside the PKI root
//! - [`request`]: `openssl req`, new key and CSR
//! - [`signer`]: `openssl ca`, CSR to certificate
//! - [`lock`]: single-flight issuance lock (in-process mutex + `flock`)
//! - [`issuance`]: the two-step issuance under the lock
//! - [`inventory`]: ledger parser
//! - [`verify`]: consistency check of issued artifacts
//! - [`configs`]: TOML configuration
//!
//! # Error Handling
//!
//! All library APIs return [`error::Result`]. Errors from the CA tool carry its
//! combined stdout/stderr, which is included when the error is displayed.

pub mod configs;
pub mod environment;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod issuance;
pub mod lock;
pub mod paths;
pub mod request;
pub mod signer;
pub mod verify;
