mod catalog;
mod config;
mod crypto;
mod db;
mod entitlement;
mod error;
mod http_client;
mod orders;
mod payment;
mod server;
mod store;

#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 里可以放商户密钥，优先于配置文件
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(store::time::BeijingTimer)
        .init();

    let config = config::Settings::load()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Checkout server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
