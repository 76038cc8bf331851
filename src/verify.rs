//! Issued Artifact Verification
//!
//! Checks what the CA tool left on disk after an issuance: the private key, CSR and
//! certificate must all parse, the CSR and certificate must carry the private key's
//! public half, and the certificate's subject CN must be the requested name. Given the
//! CA certificate, the issued certificate must also carry a valid CA signature.

use std::fs;
use std::path::Path;

use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Req, X509};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::{PkiError, Result};
use crate::paths::CertificatePaths;

fn failed(reason: impl Into<String>) -> PkiError {
    PkiError::Verification {
        reason: reason.into(),
    }
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| failed(format!("cannot read {} {}: {}", what, path.display(), e)))
}

fn load_private_key(path: &Path, passphrase: Option<&SecretString>) -> Result<PKey<Private>> {
    let pem = read_pem(path, "private key")?;
    let key = match passphrase {
        Some(passphrase) => {
            PKey::private_key_from_pem_passphrase(&pem, passphrase.expose_secret().as_bytes())
        }
        // An empty passphrase instead of OpenSSL's terminal prompt
        None => PKey::private_key_from_pem_callback(&pem, |_| Ok(0)),
    };
    key.map_err(|e| failed(format!("invalid private key {}: {}", path.display(), e)))
}

/// Subject CN of `certificate`, if it has exactly one readable CN entry
fn certificate_common_name(certificate: &X509) -> Option<String> {
    let mut entries = certificate.subject_name().entries_by_nid(Nid::COMMONNAME);
    let entry = entries.next()?;
    if entries.next().is_some() {
        return None;
    }
    entry.data().as_utf8().ok().map(|cn| cn.to_string())
}

/// Verify the key, CSR and certificate written for `common_name`.
/// `passphrase` must be given if the key was issued encrypted.
pub fn verify_issued(
    paths: &CertificatePaths,
    common_name: &str,
    passphrase: Option<&SecretString>,
    ca_cert: Option<&Path>,
) -> Result<()> {
    let private_key = load_private_key(&paths.key_path, passphrase)?;

    let request = X509Req::from_pem(&read_pem(&paths.request_path, "request")?)
        .map_err(|e| failed(format!("invalid request {}: {}", paths.request_path.display(), e)))?;
    let request_key = request
        .public_key()
        .map_err(|e| failed(format!("request has no usable public key: {}", e)))?;
    if !request_key.public_eq(&private_key) {
        return Err(failed("request public key does not match the private key"));
    }

    let certificate = X509::from_pem(&read_pem(&paths.cert_path, "certificate")?)
        .map_err(|e| failed(format!("invalid certificate {}: {}", paths.cert_path.display(), e)))?;
    let certificate_key = certificate
        .public_key()
        .map_err(|e| failed(format!("certificate has no usable public key: {}", e)))?;
    if !certificate_key.public_eq(&private_key) {
        return Err(failed(
            "certificate public key does not match the private key",
        ));
    }

    match certificate_common_name(&certificate) {
        Some(cn) if cn == common_name => {}
        Some(cn) => {
            return Err(failed(format!(
                "certificate was issued to `{}`, expected `{}`",
                cn, common_name
            )))
        }
        None => return Err(failed("certificate subject has no single CN")),
    }

    if let Some(ca_path) = ca_cert {
        let ca = X509::from_pem(&read_pem(ca_path, "CA certificate")?)
            .map_err(|e| failed(format!("invalid CA certificate {}: {}", ca_path.display(), e)))?;
        let ca_key = ca
            .public_key()
            .map_err(|e| failed(format!("CA certificate has no usable public key: {}", e)))?;
        let signed = certificate
            .verify(&ca_key)
            .map_err(|e| failed(format!("cannot check certificate signature: {}", e)))?;
        if !signed {
            return Err(failed(format!(
                "certificate is not signed by the CA in {}",
                ca_path.display()
            )));
        }
    }

    info!("Verified key, request and certificate for {}", common_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{EasyRsaLayout, PathResolver};
    use openssl::asn1::Asn1Time;
    use openssl::bn::{BigNum, MsbOption};
    use openssl::hash::MessageDigest;
    use openssl::rsa::Rsa;
    use openssl::symm::Cipher;
    use openssl::x509::{X509Name, X509NameRef, X509ReqBuilder};
    use tempfile::TempDir;

    fn generate_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn subject(cn: &str) -> X509Name {
        let mut name = X509Name::builder().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        name.build()
    }

    fn request_for(key: &PKey<Private>, cn: &str) -> X509Req {
        let mut builder = X509ReqBuilder::new().unwrap();
        builder.set_subject_name(&subject(cn)).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn certificate_for(key: &PKey<Private>, cn: &str) -> X509 {
        signed_certificate(key, cn, key, &subject(cn))
    }

    fn signed_certificate(
        key: &PKey<Private>,
        cn: &str,
        issuer_key: &PKey<Private>,
        issuer: &X509NameRef,
    ) -> X509 {
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(128, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&subject(cn)).unwrap();
        builder.set_issuer_name(issuer).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    /// Write key, CSR and certificate under a fresh easy-rsa layout
    fn write_artifacts(
        dir: &TempDir,
        key_pem: &[u8],
        request: &X509Req,
        certificate: &X509,
    ) -> CertificatePaths {
        let paths = EasyRsaLayout.resolve(dir.path(), "alice").unwrap();
        for path in paths.artifacts() {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
        }
        fs::write(&paths.key_path, key_pem).unwrap();
        fs::write(&paths.request_path, request.to_pem().unwrap()).unwrap();
        fs::write(&paths.cert_path, certificate.to_pem().unwrap()).unwrap();
        paths
    }

    #[test]
    fn test_matching_artifacts_verify() {
        let dir = TempDir::new().unwrap();
        let key = generate_key();
        let paths = write_artifacts(
            &dir,
            &key.private_key_to_pem_pkcs8().unwrap(),
            &request_for(&key, "alice"),
            &certificate_for(&key, "alice"),
        );
        verify_issued(&paths, "alice", None, None).unwrap();
    }

    #[test]
    fn test_foreign_certificate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let key = generate_key();
        let other = generate_key();
        let paths = write_artifacts(
            &dir,
            &key.private_key_to_pem_pkcs8().unwrap(),
            &request_for(&key, "alice"),
            &certificate_for(&other, "alice"),
        );
        let err = verify_issued(&paths, "alice", None, None).unwrap_err();
        assert!(err.to_string().contains("certificate public key"));
    }

    #[test]
    fn test_wrong_common_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let key = generate_key();
        let paths = write_artifacts(
            &dir,
            &key.private_key_to_pem_pkcs8().unwrap(),
            &request_for(&key, "alice"),
            &certificate_for(&key, "mallory"),
        );
        let err = verify_issued(&paths, "alice", None, None).unwrap_err();
        assert!(err.to_string().contains("mallory"));
    }

    #[test]
    fn test_encrypted_key_needs_passphrase() {
        let dir = TempDir::new().unwrap();
        let key = generate_key();
        let encrypted = key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"s3cret")
            .unwrap();
        let paths = write_artifacts(
            &dir,
            &encrypted,
            &request_for(&key, "alice"),
            &certificate_for(&key, "alice"),
        );

        let passphrase = SecretString::from("s3cret".to_string());
        verify_issued(&paths, "alice", Some(&passphrase), None).unwrap();

        let wrong = SecretString::from("guess".to_string());
        assert!(matches!(
            verify_issued(&paths, "alice", Some(&wrong), None),
            Err(PkiError::Verification { .. })
        ));
    }

    #[test]
    fn test_missing_certificate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let key = generate_key();
        let paths = write_artifacts(
            &dir,
            &key.private_key_to_pem_pkcs8().unwrap(),
            &request_for(&key, "alice"),
            &certificate_for(&key, "alice"),
        );
        fs::remove_file(&paths.cert_path).unwrap();
        let err = verify_issued(&paths, "alice", None, None).unwrap_err();
        assert!(err.to_string().contains("cannot read certificate"));
    }

    #[test]
    fn test_certificate_must_be_signed_by_ca() {
        let dir = TempDir::new().unwrap();
        let ca_key = generate_key();
        let ca_cert = certificate_for(&ca_key, "Easy-RSA CA");
        let ca_path = dir.path().join("ca.crt");
        fs::write(&ca_path, ca_cert.to_pem().unwrap()).unwrap();

        let key = generate_key();
        let paths = write_artifacts(
            &dir,
            &key.private_key_to_pem_pkcs8().unwrap(),
            &request_for(&key, "alice"),
            &signed_certificate(&key, "alice", &ca_key, ca_cert.subject_name()),
        );
        verify_issued(&paths, "alice", None, Some(&ca_path)).unwrap();

        let rogue_key = generate_key();
        fs::write(
            &paths.cert_path,
            signed_certificate(&key, "alice", &rogue_key, ca_cert.subject_name())
                .to_pem()
                .unwrap(),
        )
        .unwrap();
        let err = verify_issued(&paths, "alice", None, Some(&ca_path)).unwrap_err();
        assert!(err.to_string().contains("not signed by the CA"));
    }
}
