use stock_chat_lib::config::AppConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_chat=info,stock_chat_lib=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    stock_chat_lib::run(config).await
}
