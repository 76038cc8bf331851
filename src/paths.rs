//! Certificate Paths
//!
//! Where the key, request and certificate for a common name live inside a PKI root.
//! Paths are resolved once per issuance and the same bundle is handed to both the
//! request and the signing step.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PkiError, Result};

/// Artifact locations for one common name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificatePaths {
    pub pki_root: PathBuf,
    pub key_path: PathBuf,
    pub request_path: PathBuf,
    pub cert_path: PathBuf,
}

impl CertificatePaths {
    /// Key, CSR and certificate, in creation order
    pub fn artifacts(&self) -> [&Path; 3] {
        [&self.key_path, &self.request_path, &self.cert_path]
    }
}

/// Maps a PKI root and common name onto artifact paths
pub trait PathResolver: Send + Sync {
    fn resolve(&self, pki_root: &Path, common_name: &str) -> Result<CertificatePaths>;
}

/// The layout the `easyrsa` script uses: `private/<cn>.key`, `reqs/<cn>.req`,
/// `issued/<cn>.crt`
#[derive(Debug, Clone, Copy, Default)]
pub struct EasyRsaLayout;

impl PathResolver for EasyRsaLayout {
    fn resolve(&self, pki_root: &Path, common_name: &str) -> Result<CertificatePaths> {
        validate_file_stem(common_name)?;
        Ok(CertificatePaths {
            pki_root: pki_root.to_path_buf(),
            key_path: pki_root
                .join("private")
                .join(format!("{}.key", common_name)),
            request_path: pki_root.join("reqs").join(format!("{}.req", common_name)),
            cert_path: pki_root
                .join("issued")
                .join(format!("{}.crt", common_name)),
        })
    }
}

/// The common name becomes a file name, so it must not escape its directory
fn validate_file_stem(common_name: &str) -> Result<()> {
    let invalid = common_name.is_empty()
        || common_name == "."
        || common_name == ".."
        || common_name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(PkiError::Config {
            reason: format!("common name {:?} cannot be used as a file name", common_name),
        });
    }
    Ok(())
}
