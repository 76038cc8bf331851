//! Configuration Module
//!
//! TOML-backed configuration for the issuer: where the easy-rsa PKI lives, how to
//! invoke OpenSSL, the CA defaults exported to the tool's environment, the default
//! subject fields, and the key size of each named endpoint.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PkiError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pki: PkiConfig,
    pub openssl: OpensslConfig,
    #[serde(default)]
    pub ca: CaDefaults,
    #[serde(default)]
    pub subject: SubjectDefaults,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PkiConfig {
    /// easy-rsa PKI root, exported as `EASYRSA_PKI`
    pub root: PathBuf,
    /// CA certificate issued certificates are checked against
    pub cacert: Option<PathBuf>,
    /// CA ledger (`index.txt`)
    pub index: Option<PathBuf>,
}

impl PkiConfig {
    pub fn cacert_path(&self) -> PathBuf {
        self.cacert
            .clone()
            .unwrap_or_else(|| self.root.join("ca.crt"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.index
            .clone()
            .unwrap_or_else(|| self.root.join("index.txt"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpensslConfig {
    #[serde(default = "default_openssl_binary")]
    pub binary: PathBuf,
    /// OpenSSL configuration file passed via `-config`
    pub config: PathBuf,
    /// Upper bound for a single OpenSSL invocation; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OpensslConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_openssl_binary() -> PathBuf {
    PathBuf::from("/usr/bin/openssl")
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaDefaults {
    #[serde(default = "default_cert_expire_days")]
    pub cert_expire_days: u32,
    #[serde(default = "default_crl_days")]
    pub crl_days: u32,
    #[serde(default = "default_digest")]
    pub digest: String,
    #[serde(default = "default_dn_mode")]
    pub dn_mode: String,
}

impl Default for CaDefaults {
    fn default() -> Self {
        Self {
            cert_expire_days: default_cert_expire_days(),
            crl_days: default_crl_days(),
            digest: default_digest(),
            dn_mode: default_dn_mode(),
        }
    }
}

fn default_cert_expire_days() -> u32 {
    3650
}

fn default_crl_days() -> u32 {
    180
}

fn default_digest() -> String {
    "sha256".to_string()
}

fn default_dn_mode() -> String {
    "cn_only".to_string()
}

/// Subject fields exported as `EASYRSA_REQ_*`. With `dn_mode = "cn_only"` the CA
/// tool only puts the CN in the certificate; the rest matter for `org` mode.
#[derive(Debug, Deserialize, Clone)]
pub struct SubjectDefaults {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_province")]
    pub province: String,
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_organizational_unit")]
    pub organizational_unit: String,
    #[serde(default = "default_email")]
    pub email: String,
}

impl Default for SubjectDefaults {
    fn default() -> Self {
        Self {
            country: default_country(),
            province: default_province(),
            city: default_city(),
            organization: default_organization(),
            organizational_unit: default_organizational_unit(),
            email: default_email(),
        }
    }
}

fn default_country() -> String {
    "US".to_string()
}

fn default_province() -> String {
    "California".to_string()
}

fn default_city() -> String {
    "San Francisco".to_string()
}

fn default_organization() -> String {
    "Copyleft Certificate Co".to_string()
}

fn default_organizational_unit() -> String {
    "My Organizational Unit".to_string()
}

fn default_email() -> String {
    "me@example.net".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    #[serde(default = "default_keysize")]
    pub keysize: u32,
}

fn default_keysize() -> u32 {
    2048
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|e| PkiError::Config {
            reason: format!("failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(config_str).map_err(|e| PkiError::Config {
            reason: format!("failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pki.root.as_os_str().is_empty() {
            return Err(PkiError::Config {
                reason: "pki.root must not be empty".to_string(),
            });
        }
        if self.openssl.config.as_os_str().is_empty() {
            return Err(PkiError::Config {
                reason: "openssl.config must not be empty".to_string(),
            });
        }
        for (name, endpoint) in &self.endpoints {
            if endpoint.keysize == 0 {
                return Err(PkiError::Config {
                    reason: format!("endpoint `{}` has a zero key size", name),
                });
            }
        }
        Ok(())
    }

    pub fn endpoint(&self, name: &str) -> Result<&EndpointConfig> {
        self.endpoints
            .get(name)
            .ok_or_else(|| PkiError::UnknownEndpoint {
                name: name.to_string(),
            })
    }
}
