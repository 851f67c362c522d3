use promptgate::error::StartupError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,promptgate=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        tracing::error!("startup failed: {}", err);
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let state = promptgate::app::load_state()?;
    let listen = state.runtime.listen.clone();
    let addr: std::net::SocketAddr =
        listen
            .parse()
            .map_err(|source| StartupError::ListenAddr {
                addr: listen.clone(),
                source,
            })?;
    let app = promptgate::app::build_app(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        default_model = state.model_registry.default_model(),
        models = state.model_registry.model_ids().count(),
        "listening on {}",
        addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
