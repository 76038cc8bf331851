//! Issuance Orchestrator
//!
//! Issues a client certificate in two steps, request generation then signing, under the
//! issuance lock:
//!
//! ```text
//! Idle ──generate_request──▶ RequestGenerated ──sign_request──▶ Signed
//! ```
//!
//! There is no retry and no cleanup: if signing fails, the key and CSR written by the
//! first step stay on disk. Issuing the same common name twice runs both steps twice.
//!
//! # Example
//!
//! ```no_run
//! use pki_issuer::configs::AppConfig;
//! use pki_issuer::issuance::Issuer;
//!
//! # async fn example() -> pki_issuer::error::Result<()> {
//! let config = AppConfig::from_file("config.toml")?;
//! let issuer = Issuer::from_config(&config);
//! let paths = issuer.issue("vpn", "alice", None).await?;
//! println!("certificate at {}", paths.cert_path.display());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info};

use crate::configs::AppConfig;
use crate::environment::AuthorityTool;
use crate::error::Result;
use crate::executor::{Execute, ProcessExecutor};
use crate::lock::IssuanceLock;
use crate::paths::{CertificatePaths, EasyRsaLayout, PathResolver};
use crate::request::{generate_request, IssuanceRequest};
use crate::signer::sign_request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    Idle,
    RequestGenerated,
    Signed,
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssuanceState::Idle => "idle",
            IssuanceState::RequestGenerated => "request generated",
            IssuanceState::Signed => "signed",
        };
        f.write_str(name)
    }
}

/// Issues client certificates for the configured endpoints
#[derive(Clone)]
pub struct Issuer {
    executor: Arc<dyn Execute>,
    resolver: Arc<dyn PathResolver>,
    tool: AuthorityTool,
    lock: IssuanceLock,
    config: Arc<AppConfig>,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("tool", &self.tool)
            .field("lock", &self.lock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Issuer {
    /// Issuer running the configured OpenSSL binary with the easy-rsa file layout
    /// and a lock file in the PKI root
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            executor: Arc::new(ProcessExecutor::with_timeout(config.openssl.timeout())),
            resolver: Arc::new(EasyRsaLayout),
            tool: AuthorityTool::from_config(config),
            lock: IssuanceLock::for_pki_root(&config.pki.root),
            config: Arc::new(config.clone()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Execute>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Generate a key and CSR for `common_name` and sign it.
    ///
    /// The key size comes from `endpoint`. With a `passphrase` the private key is
    /// written encrypted. Paths are resolved once and used by both steps; the
    /// issuance lock is held from before the first step until the second finishes
    /// or either fails.
    pub async fn issue(
        &self,
        endpoint: &str,
        common_name: &str,
        passphrase: Option<&SecretString>,
    ) -> Result<CertificatePaths> {
        let key_size = self.config.endpoint(endpoint)?.keysize;
        let paths = self.resolver.resolve(&self.config.pki.root, common_name)?;
        let request = IssuanceRequest {
            common_name: common_name.to_string(),
            key_size,
            config_path: self.config.openssl.config.clone(),
            paths,
        };

        let _guard = self.lock.acquire().await?;
        info!(
            "Issuing certificate for {} (endpoint {}, rsa:{})",
            common_name, endpoint, key_size
        );
        debug!("Issuance of {}: {}", common_name, IssuanceState::Idle);

        generate_request(
            self.executor.as_ref(),
            &self.tool,
            &request,
            passphrase,
        )
        .await?;
        debug!("Issuance of {}: {}", common_name, IssuanceState::RequestGenerated);

        sign_request(self.executor.as_ref(), &self.tool, &request).await?;
        debug!("Issuance of {}: {}", common_name, IssuanceState::Signed);

        Ok(request.paths)
    }
}
