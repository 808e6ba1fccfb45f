use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use common_observability::AuthMetrics;
use oidc_auth::{AuthorizationSettings, OidcApiAuthorizer};
use sample_api::api::HEALTH_KEY_HEADER;
use sample_api::{build_router, AppState};
use std::{
    env,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = AuthorizationSettings::from_env();
    match settings.validate() {
        // Keep serving so /healthz can report the problem.
        Err(err) => error!(
            error = %err,
            "OIDC authorization is misconfigured; requests will be rejected"
        ),
        Ok(()) => info!(
            issuer = settings.issuer_url(),
            audience = settings.audience(),
            "OIDC authorization configured"
        ),
    }

    let authorizer = OidcApiAuthorizer::from_settings(settings)
        .context("failed to build OIDC authorizer")?;
    let metrics = AuthMetrics::new().context("failed to register metrics")?;
    let mut state = AppState::new(Arc::new(authorizer), Arc::new(metrics));
    match env::var("HEALTH_CHECK_KEY") {
        Ok(key) if !key.trim().is_empty() => state = state.with_health_key(key.trim()),
        _ => warn!("HEALTH_CHECK_KEY is not set; /healthz is open to any caller"),
    }

    let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(HEALTH_KEY_HEADER),
        ]);

    let app = build_router(state).layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7071);
    let ip: IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting sample-api");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
