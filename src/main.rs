//! pageblob-upload: upload a local file to Azure Blob Storage.

use clap::Parser;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pageblob_upload::{Args, Config, RestBlobClient, UploadOutcome};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging; RUST_LOG wins over the flags when set
    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from(args);
    let client = Arc::new(RestBlobClient::new(&config.client)?);

    let outcome = config.request.create(client, &config.upload).await?;
    let blob = &config.request.location;
    match outcome {
        UploadOutcome::Copied { copy_id } => println!("copied into {blob} (copy id {copy_id})"),
        UploadOutcome::CreatedEmpty { blob_type, size } => {
            println!("created empty {blob_type} {blob} ({size} bytes)")
        }
        UploadOutcome::UploadedBlock { bytes, .. } => {
            println!("uploaded {bytes} bytes to block blob {blob}")
        }
        UploadOutcome::UploadedPages(summary) => println!(
            "uploaded {} bytes in {} ranges to page blob {blob} ({} bytes)",
            summary.bytes, summary.ranges, summary.blob_size
        ),
    }

    Ok(())
}
