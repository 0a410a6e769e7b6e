use std::{net::SocketAddr, sync::Arc};

use coldfinance_auth::{
    build_api_route_filter, handle_auth_errors, with_auth, Auth, AuthConfig, MemoryAccountStore,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use warp::{path, Filter};

// Run with COLDFINANCE_TOKEN_SECRET set, either in the environment or in a .env file.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coldfinance_auth=debug,info")),
        )
        .init();

    let account_store = Arc::new(MemoryAccountStore::new());
    let config = AuthConfig::from_env(account_store)?;

    let auth = Auth::new(config);

    let auth_routes = build_api_route_filter(&auth);

    let unsecured_homepage =
        warp::path::end().then(|| async move { warp::reply::html("hello, world!") });

    let secure_page = path!("me")
        .and(with_auth(&auth))
        .then(|email| async move { warp::reply::json(&json!({ "email": email })) });

    let all_routes = unsecured_homepage
        .or(secure_page)
        .or(auth_routes)
        .recover(handle_auth_errors)
        .with(warp::trace::request());

    let addr: SocketAddr = "127.0.0.1:4000".parse()?;
    tracing::info!(%addr, "listening");
    warp::serve(all_routes).run(addr).await;

    Ok(())
}
