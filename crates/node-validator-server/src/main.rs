// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use node_validator_core::{InstanceTemplateWhitelistProvider, InstanceValidator, WhitelistProvider};
use node_validator_server::{
    build_router, init_tracing, validate_startup_config, AppState, GcpRestClient, ServerConfig,
    WebhookPolicy,
};
use node_validator_store::{
    CloudStorageWhitelistProvider, GcsObjectStore, MetadataServerToken, StaticToken, TokenSource,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cfg = ServerConfig::from_env().map_err(|e| e.to_string())?;
    init_tracing(&cfg.log_level, cfg.log_json);
    validate_startup_config(&cfg).map_err(|e| e.to_string())?;

    let client = GcsObjectStore::default_client(cfg.http_timeout).map_err(|e| e.to_string())?;
    let tokens: Arc<dyn TokenSource> = match &cfg.access_token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(MetadataServerToken::new(client.clone())),
    };

    let gcp = Arc::new(GcpRestClient::new(client.clone(), tokens.clone()));
    let store = Arc::new(GcsObjectStore::new(client, tokens));
    let providers: Vec<Arc<dyn WhitelistProvider>> = vec![
        Arc::new(InstanceTemplateWhitelistProvider::new(gcp.clone(), gcp.clone())),
        Arc::new(
            CloudStorageWhitelistProvider::new(store, cfg.whitelist_bucket.clone())
                .with_prefix(cfg.whitelist_prefix.clone())
                .with_cache_ttl(cfg.whitelist_cache_ttl),
        ),
    ];
    let validator =
        InstanceValidator::new(providers).with_user_data_redaction(cfg.redact_user_data);

    let state = AppState::new(WebhookPolicy::from_config(&cfg), validator, gcp)
        .with_retry(cfg.retry_policy());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind {addr} failed: {e}"))?;
    info!(
        project_id = %cfg.project_id,
        delete_invalid = cfg.delete_invalid,
        cluster_ids = ?cfg.cluster_ids,
        bucket = %cfg.whitelist_bucket,
        "node-validator listening on {addr}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"))
}
