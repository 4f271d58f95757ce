//! TradeHub CLI - product image storage from the command line.
//!
//! Configuration comes from the environment (see `Config::from_env`).

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tradehub_cli::{init_tracing, truncate_string, AppContext};
use tradehub_core::{estimate_chunk_count, verify_pix_payload, Config, DataUrl, PixPayload};
use tradehub_services::UploadImage;

const PREVIEW_LEN: usize = 80;

#[derive(Parser)]
#[command(name = "tradehub", about = "TradeHub product image CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress, thumbnail and store an image for a product
    Upload {
        /// Path to the image file
        file: PathBuf,
        /// Product the image belongs to
        #[arg(long)]
        product: String,
        /// Seller uploading the image
        #[arg(long)]
        user: String,
    },
    /// Resolve a blob reference to its full image
    Fetch {
        /// Blob reference (products-images/{id})
        reference: String,
        /// Write the decoded image to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a stored image and its cache entry
    Delete {
        /// Blob reference (products-images/{id})
        reference: String,
    },
    /// Remove expired entries from the local image cache
    CacheSweep,
    /// Build a PIX "copia e cola" payload
    Pix {
        /// Amount in BRL, e.g. 123.45
        #[arg(long)]
        amount: Decimal,
        /// Transaction id (alphanumeric, up to 25 characters)
        #[arg(long)]
        txid: Option<String>,
    },
    /// Check the CRC of a PIX "copia e cola" payload
    PixCheck {
        /// Payload to verify
        payload: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let cli = Cli::parse();

    let ctx = AppContext::from_config(config).await?;
    let result = run(&ctx, cli.command).await;
    ctx.shutdown().await;
    result
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload {
            file,
            product,
            user,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let source_chunks = estimate_chunk_count(data.len() as u64, ctx.config.chunk_size);
            tracing::info!(
                path = %file.display(),
                size_bytes = data.len(),
                chunk_count = source_chunks,
                "Uploading image"
            );
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());

            let source_size = data.len();
            let entry = ctx
                .images
                .add_image(UploadImage {
                    product_id: product,
                    user_id: user,
                    file_name,
                    bytes: Bytes::from(data),
                })
                .await?;
            print_json(&serde_json::json!({
                "image": entry,
                "source_size_bytes": source_size,
                "source_chunk_estimate": source_chunks,
            }))?;
        }
        Commands::Fetch { reference, out } => {
            let data = ctx.resolver.resolve(&reference).await?;
            let url = DataUrl::parse(&data)?;

            match out {
                Some(path) => {
                    let bytes = url.decode_bytes()?;
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    print_json(&serde_json::json!({
                        "reference": reference,
                        "mime_type": url.mime_type,
                        "size_bytes": bytes.len(),
                        "out": path.display().to_string(),
                    }))?;
                }
                None => {
                    print_json(&serde_json::json!({
                        "reference": reference,
                        "mime_type": url.mime_type,
                        "size_bytes": url.decoded_len(),
                        "data_url": truncate_string(&data, PREVIEW_LEN),
                    }))?;
                }
            }
        }
        Commands::Delete { reference } => {
            let chunks = ctx.blobs.delete(&reference).await?;
            ctx.resolver.invalidate(&reference).await;
            print_json(&serde_json::json!({
                "success": true,
                "reference": reference,
                "chunks_deleted": chunks,
            }))?;
        }
        Commands::CacheSweep => {
            let removed = ctx.cache.sweep_expired().await;
            let flushed = ctx.cache.flush().await;
            print_json(&serde_json::json!({
                "removed": removed,
                "flushed": flushed,
                "entries": ctx.cache.len().await,
                "total_size": ctx.cache.total_size().await,
                "capacity_bytes": ctx.config.cache_capacity_bytes,
            }))?;
        }
        Commands::Pix { amount, txid } => pix(&ctx.config, amount, txid)?,
        Commands::PixCheck { payload } => {
            print_json(&serde_json::json!({ "valid": verify_pix_payload(&payload) }))?;
        }
    }
    Ok(())
}

fn pix(config: &Config, amount: Decimal, txid: Option<String>) -> anyhow::Result<()> {
    let key = config.pix_key.clone().context("PIX_KEY is not set")?;
    let name = config
        .pix_merchant_name
        .clone()
        .context("PIX_MERCHANT_NAME is not set")?;
    let city = config
        .pix_merchant_city
        .clone()
        .context("PIX_MERCHANT_CITY is not set")?;

    let mut payload = PixPayload::new(key, name, city).with_amount(amount);
    if let Some(txid) = txid {
        payload = payload.with_txid(txid);
    }
    let encoded = payload.encode()?;
    print_json(&serde_json::json!({ "payload": encoded }))
}
