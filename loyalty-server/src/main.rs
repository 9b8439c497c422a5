use loyalty_server::{Config, Server, ServerState, init_logger, init_logger_with_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env();

    // Production logs to rolling daily files, development to stdout
    if config.is_production() {
        std::fs::create_dir_all(config.log_dir()).ok();
        init_logger_with_file(None, Some(&config.log_dir()));
    } else {
        init_logger();
    }

    tracing::info!(
        environment = %config.environment,
        port = config.http_port,
        "Loyalty server starting"
    );

    let state = ServerState::initialize(&config).await?;
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {e}");
        return Err(e);
    }

    Ok(())
}
