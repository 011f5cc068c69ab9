use anyhow::Context;
use b2c_accounts_api::accounts::AccountStore;
use b2c_accounts_api::api::{self, AppState};
use b2c_accounts_api::config::Config;
use b2c_accounts_api::{telemetry, AuthorizationLayer};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let config = Config::parse();

    let key_set_cache = config
        .key_set_cache()
        .context("build JWKS discovery URL from tenant and policy")?;
    let authorization =
        AuthorizationLayer::with_remote_key_set(key_set_cache, config.token_verifier());
    let state = AppState {
        accounts: AccountStore::new(&config.accounts_file),
    };
    let app = api::router(state, authorization);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        tenant = %config.tenant_name,
        policy = %config.policy,
        accounts_file = %config.accounts_file.display(),
        "account API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
