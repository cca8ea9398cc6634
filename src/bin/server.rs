use argh::FromArgs;
use infernum_vqa::{
    EngineOptions, QueryEngine,
    config::{self, ServerConfig},
    paligemma::{self, PaligemmaModel},
    provision::{HubWeights, ensure_weights},
    server,
};
use std::{path::PathBuf, sync::Arc};

#[derive(FromArgs)]
/// Serves visual queries against a vision-language model.
struct ServerArgs {
    /// path to a TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// the host to run the server on
    #[argh(option, short = 'h')]
    host: Option<String>,

    /// the port to run the server on
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    infernum_vqa::init_logging();
    let args: ServerArgs = argh::from_env();

    let mut config: ServerConfig = config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    paligemma::check_model_identity(&config.model)?;
    let accelerator = config.model.accelerator.resolve()?;
    log::info!("Running {} on {}", config.model.model_id, accelerator.as_str());

    // weights must be in the cache before the model is built
    let weights = HubWeights::new(&config.model)?;
    ensure_weights(&weights, &config.model)?;

    let model = PaligemmaModel::load(&config.model)?;
    let engine = Arc::new(QueryEngine::new(
        model,
        EngineOptions {
            caption: config.model.caption,
        },
    ));

    let app = server::router(engine, config.max_body_bytes);
    let addr = config.addr();

    log::info!("🚀 Starting the inference server");
    log::info!("🔥 Listening on: {addr}");
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
