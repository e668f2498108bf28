use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build Tokio runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(dinkbot::bot::run()) {
        tracing::error!(error = %e, "Error starting bot");
        std::process::exit(1);
    }
}
