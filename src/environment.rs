//! Authority Environment
//!
//! easy-rsa's OpenSSL configuration reads its settings from `EASYRSA_*` environment
//! variables. This module builds that environment from configuration so the CA tool
//! sees the same calling convention the `easyrsa` script would give it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::configs::{AppConfig, CaDefaults, SubjectDefaults};
use crate::executor::ProcessInvocation;

pub const EASYRSA_PKI: &str = "EASYRSA_PKI";
pub const EASYRSA_CERT_EXPIRE: &str = "EASYRSA_CERT_EXPIRE";
pub const EASYRSA_CRL_DAYS: &str = "EASYRSA_CRL_DAYS";
pub const EASYRSA_DIGEST: &str = "EASYRSA_DIGEST";
pub const EASYRSA_KEY_SIZE: &str = "EASYRSA_KEY_SIZE";
pub const EASYRSA_DN: &str = "EASYRSA_DN";
pub const EASYRSA_REQ_CN: &str = "EASYRSA_REQ_CN";
pub const EASYRSA_REQ_COUNTRY: &str = "EASYRSA_REQ_COUNTRY";
pub const EASYRSA_REQ_PROVINCE: &str = "EASYRSA_REQ_PROVINCE";
pub const EASYRSA_REQ_CITY: &str = "EASYRSA_REQ_CITY";
pub const EASYRSA_REQ_ORG: &str = "EASYRSA_REQ_ORG";
pub const EASYRSA_REQ_OU: &str = "EASYRSA_REQ_OU";
pub const EASYRSA_REQ_EMAIL: &str = "EASYRSA_REQ_EMAIL";

/// CA and subject defaults exported to every CA tool invocation
#[derive(Debug, Clone)]
pub struct AuthorityEnvironment {
    ca: CaDefaults,
    subject: SubjectDefaults,
}

impl AuthorityEnvironment {
    pub fn new(ca: CaDefaults, subject: SubjectDefaults) -> Self {
        Self { ca, subject }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ca.clone(), config.subject.clone())
    }

    /// The complete child environment for one request or signing step
    pub fn for_request(
        &self,
        pki_root: &Path,
        common_name: &str,
        key_size: u32,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(EASYRSA_PKI.to_string(), pki_root.display().to_string());
        env.insert(
            EASYRSA_CERT_EXPIRE.to_string(),
            self.ca.cert_expire_days.to_string(),
        );
        env.insert(EASYRSA_CRL_DAYS.to_string(), self.ca.crl_days.to_string());
        env.insert(EASYRSA_DIGEST.to_string(), self.ca.digest.clone());
        env.insert(EASYRSA_KEY_SIZE.to_string(), key_size.to_string());
        env.insert(EASYRSA_DN.to_string(), self.ca.dn_mode.clone());
        env.insert(EASYRSA_REQ_CN.to_string(), common_name.to_string());
        env.insert(
            EASYRSA_REQ_COUNTRY.to_string(),
            self.subject.country.clone(),
        );
        env.insert(
            EASYRSA_REQ_PROVINCE.to_string(),
            self.subject.province.clone(),
        );
        env.insert(EASYRSA_REQ_CITY.to_string(), self.subject.city.clone());
        env.insert(
            EASYRSA_REQ_ORG.to_string(),
            self.subject.organization.clone(),
        );
        env.insert(
            EASYRSA_REQ_OU.to_string(),
            self.subject.organizational_unit.clone(),
        );
        env.insert(EASYRSA_REQ_EMAIL.to_string(), self.subject.email.clone());
        env
    }
}

/// The CA binary together with the environment every invocation of it receives
#[derive(Debug, Clone)]
pub struct AuthorityTool {
    binary: PathBuf,
    environment: AuthorityEnvironment,
}

impl AuthorityTool {
    pub fn new(binary: impl Into<PathBuf>, environment: AuthorityEnvironment) -> Self {
        Self {
            binary: binary.into(),
            environment,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.openssl.binary.clone(),
            AuthorityEnvironment::from_config(config),
        )
    }

    /// Build an invocation of the CA binary. `extra_env` is added on top of the
    /// authority environment.
    pub fn invocation(
        &self,
        args: Vec<String>,
        pki_root: &Path,
        common_name: &str,
        key_size: u32,
        extra_env: impl IntoIterator<Item = (String, String)>,
    ) -> ProcessInvocation {
        let mut env = self
            .environment
            .for_request(pki_root, common_name, key_size);
        env.extend(extra_env);
        ProcessInvocation::new(self.binary.clone(), args, env)
    }
}
