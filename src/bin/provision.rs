use argh::FromArgs;
use infernum_vqa::{
    config::{self, ServerConfig},
    provision::{HubWeights, provision_with_timeout},
};
use std::{path::PathBuf, time::Duration};

#[derive(FromArgs)]
/// Downloads the model weights into the local cache. Safe to run repeatedly.
struct ProvisionArgs {
    /// path to the inference server's TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

// the process exits on timeout even if a download thread is still blocked
fn main() -> Result<(), Box<dyn std::error::Error>> {
    infernum_vqa::init_logging();
    let args: ProvisionArgs = argh::from_env();

    let config: ServerConfig = config::load(args.config.as_deref())?;
    let model = config.model;

    #[cfg(feature = "paligemma")]
    infernum_vqa::paligemma::check_model_identity(&model)?;

    log::info!("Provisioning {} ({})", model.model_id, model.revision);

    let weights = HubWeights::new(&model)?;
    let report = provision_with_timeout(weights, Duration::from_secs(model.timeout_secs))?;

    for path in &report.downloaded {
        log::info!("downloaded {}", path.display());
    }
    log::info!(
        "Done: {} downloaded, {} already cached",
        report.downloaded.len(),
        report.cached.len()
    );

    Ok(())
}
