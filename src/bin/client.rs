use argh::FromArgs;
use infernum_vqa::{InferenceClient, codec};
use std::{path::PathBuf, time::Duration};

// defaults for the client
const DEFAULT_URL: &str = "http://localhost:3000/foo";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(FromArgs)]
/// Sends an image file and a prompt to the inference service and prints the answer.
struct ClientArgs {
    /// full URL of the inference service's query endpoint
    #[argh(option, short = 'u', default = "DEFAULT_URL.to_string()")]
    url: String,

    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p', default = "String::new()")]
    prompt: String,

    /// request timeout in seconds
    #[argh(option, short = 't', default = "DEFAULT_TIMEOUT_SECS")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    infernum_vqa::init_logging();
    let args: ClientArgs = argh::from_env();

    // the service decodes the bytes, so send the file as-is
    let bytes = tokio::fs::read(&args.image_path).await?;
    let client = InferenceClient::new(&args.url, Duration::from_secs(args.timeout))?;

    let answer = client.query(&args.prompt, &codec::encode_base64(&bytes)).await?;
    println!("{answer}");

    Ok(())
}
