use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::{KeySetCache, TokenVerifier};

/// Service configuration, read from the command line or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "b2c-accounts-api", version, about)]
pub struct Config {
    /// B2C directory (tenant) name, e.g. `contoso` for `contoso.onmicrosoft.com`.
    #[arg(long, env = "B2C_DIR")]
    pub tenant_name: String,

    /// Directory (tenant) id, part of the expected token issuer.
    #[arg(long, env = "TENANT_ID")]
    pub tenant_id: String,

    /// User flow whose signing keys are trusted.
    #[arg(long, env = "B2C_POLICY", default_value = "B2C_1_signupsignin1")]
    pub policy: String,

    /// Application (client) id of this API, the expected token audience.
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5001")]
    pub bind_addr: SocketAddr,

    /// JSON file holding the account records.
    #[arg(long, env = "ACCOUNTS_FILE", default_value = "accounts.json")]
    pub accounts_file: PathBuf,

    #[arg(long, env = "JWKS_CACHE_TTL_SECS", default_value_t = 3600)]
    pub jwks_cache_ttl_secs: u64,

    #[arg(long, env = "JWKS_REFRESH_COOLDOWN_SECS", default_value_t = 300)]
    pub jwks_refresh_cooldown_secs: u64,

    #[arg(long, env = "JWKS_FETCH_TIMEOUT_SECS", default_value_t = 5)]
    pub jwks_fetch_timeout_secs: u64,
}

impl Config {
    /// Signing key discovery endpoint of the configured tenant and policy.
    pub fn jwks_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "https://{tenant}.b2clogin.com/{tenant}.onmicrosoft.com/{policy}/discovery/v2.0/keys",
            tenant = self.tenant_name,
            policy = self.policy,
        ))
    }

    pub fn issuer(&self) -> String {
        format!(
            "https://{}.b2clogin.com/{}/v2.0/",
            self.tenant_name, self.tenant_id
        )
    }

    pub fn key_set_cache(&self) -> Result<KeySetCache, url::ParseError> {
        Ok(KeySetCache::builder(self.jwks_url()?)
            .with_cache(Duration::from_secs(self.jwks_cache_ttl_secs))
            .with_refresh_cooldown(Duration::from_secs(self.jwks_refresh_cooldown_secs))
            .with_timeout(Duration::from_secs(self.jwks_fetch_timeout_secs))
            .build())
    }

    pub fn token_verifier(&self) -> TokenVerifier {
        TokenVerifier::new(self.issuer(), self.client_id.clone())
    }
}
