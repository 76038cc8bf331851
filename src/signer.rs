//! Request Signing
//!
//! Second issuance step: `openssl ca` signs the CSR written by
//! [`generate_request`](crate::request::generate_request). The CA tool writes the
//! certificate and appends it to the ledger.

use tracing::info;

use crate::environment::AuthorityTool;
use crate::error::Result;
use crate::executor::{Execute, ProcessInvocation};
use crate::request::IssuanceRequest;

pub fn sign_invocation(tool: &AuthorityTool, request: &IssuanceRequest) -> ProcessInvocation {
    let args = vec![
        "ca".to_string(),
        "-utf8".to_string(),
        "-in".to_string(),
        request.paths.request_path.display().to_string(),
        "-out".to_string(),
        request.paths.cert_path.display().to_string(),
        "-config".to_string(),
        request.config_path.display().to_string(),
        "-batch".to_string(),
    ];

    tool.invocation(
        args,
        &request.paths.pki_root,
        &request.common_name,
        request.key_size,
        std::iter::empty(),
    )
}

/// Sign the CSR for `request` into its certificate
pub async fn sign_request(
    executor: &dyn Execute,
    tool: &AuthorityTool,
    request: &IssuanceRequest,
) -> Result<()> {
    let invocation = sign_invocation(tool, request);
    executor.execute(&invocation).await?;

    info!("Cert written to {}", request.paths.cert_path.display());
    Ok(())
}
