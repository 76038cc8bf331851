//! Request Generation
//!
//! First issuance step: `openssl req` creates a new RSA key and a CSR for the common
//! name at the resolved paths.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::environment::AuthorityTool;
use crate::error::Result;
use crate::executor::{Execute, ProcessInvocation};
use crate::paths::CertificatePaths;

/// Environment variable the key passphrase is handed over in
pub const PASSPHRASE_ENV: &str = "PKI_KEY_PASSPHRASE";

/// Everything one issuance needs, fixed before the first step runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRequest {
    pub common_name: String,
    pub key_size: u32,
    /// OpenSSL configuration file passed via `-config`
    pub config_path: PathBuf,
    pub paths: CertificatePaths,
}

/// Build the `openssl req` invocation. Without a passphrase the key is written
/// unencrypted (`-nodes`); with one, the tool encrypts it and reads the passphrase
/// from [`PASSPHRASE_ENV`] so it never shows up on the command line.
pub fn request_invocation(
    tool: &AuthorityTool,
    request: &IssuanceRequest,
    passphrase: Option<&SecretString>,
) -> ProcessInvocation {
    let mut args = vec![
        "req".to_string(),
        "-utf8".to_string(),
        "-new".to_string(),
        "-newkey".to_string(),
        format!("rsa:{}", request.key_size),
        "-config".to_string(),
        request.config_path.display().to_string(),
        "-keyout".to_string(),
        request.paths.key_path.display().to_string(),
        "-out".to_string(),
        request.paths.request_path.display().to_string(),
    ];

    let mut extra_env = Vec::new();
    match passphrase {
        Some(passphrase) => {
            args.push("-passout".to_string());
            args.push(format!("env:{}", PASSPHRASE_ENV));
            extra_env.push((
                PASSPHRASE_ENV.to_string(),
                passphrase.expose_secret().to_string(),
            ));
        }
        None => args.push("-nodes".to_string()),
    }
    args.push("-batch".to_string());

    tool.invocation(
        args,
        &request.paths.pki_root,
        &request.common_name,
        request.key_size,
        extra_env,
    )
}

/// Generate the private key and CSR for `request`
pub async fn generate_request(
    executor: &dyn Execute,
    tool: &AuthorityTool,
    request: &IssuanceRequest,
    passphrase: Option<&SecretString>,
) -> Result<()> {
    let invocation = request_invocation(tool, request, passphrase);
    executor.execute(&invocation).await?;

    info!("Key written to {}", request.paths.key_path.display());
    info!("Req written to {}", request.paths.request_path.display());
    Ok(())
}
