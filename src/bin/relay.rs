use argh::FromArgs;
use infernum_vqa::{
    InferenceClient,
    capture::{FrameSource, StillImageSource},
    config::{self, ConfigError, RelayConfig},
    relay::{self, RelayState},
};
use std::{path::PathBuf, time::Duration};

#[derive(FromArgs)]
/// Captures frames, forwards them for visual queries and serves the results page.
struct RelayArgs {
    /// path to a TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// the host to run the relay on
    #[argh(option, short = 'h')]
    host: Option<String>,

    /// the port to run the relay on
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// full URL of the inference service's query endpoint
    #[argh(option, short = 'u')]
    inference_url: Option<String>,

    /// serve this image file instead of a camera frame
    #[argh(option, short = 'i')]
    still_image: Option<PathBuf>,
}

fn frame_source(config: &RelayConfig) -> Result<Box<dyn FrameSource>, ConfigError> {
    if let Some(path) = &config.still_image {
        return Ok(Box::new(StillImageSource::new(path)));
    }

    #[cfg(feature = "camera")]
    {
        Ok(Box::new(infernum_vqa::capture::CameraSource::new(
            config.camera_index,
        )))
    }

    #[cfg(not(feature = "camera"))]
    {
        Err(ConfigError::Invalid(
            "built without the `camera` feature; set `still_image` instead".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    infernum_vqa::init_logging();
    let args: RelayArgs = argh::from_env();

    let mut config: RelayConfig = config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.inference_url {
        config.inference_url = url;
    }
    if args.still_image.is_some() {
        config.still_image = args.still_image;
    }
    config.validate()?;

    let frames = frame_source(&config)?;
    let client = InferenceClient::new(
        &config.inference_url,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    log::info!("Capturing from {}", frames.describe());
    log::info!("Forwarding queries to {}", client.endpoint());

    let app = relay::router(RelayState::new(frames, client, config.poll_interval_ms));
    let addr = config.addr();

    log::info!("🚀 Starting the relay");
    log::info!("🔥 Open http://{addr}/ in a browser");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
