mod sink;

use ai::{openai::OpenAICaption, ModelLoader};
use anyhow::Context;
use caption_pool::{BatchConfig, BatchScheduler, CaptionStatus};
use dotenvy::dotenv;
use sink::ImageSink;
use std::{env, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_result = dotenv();
    init_tracing(); // should be after dotenv() so RUST_LOG in .env file will be loaded
    match dotenv_result {
        Ok(path) => info!(".env read successfully from {}", path.display()),
        Err(e) => debug!("Could not load .env file: {e}"),
    };

    let images: Vec<String> = env::args().skip(1).collect();
    if images.is_empty() {
        anyhow::bail!("usage: caption-cli <image> [<image> ...]");
    }

    let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let api_key = env::var("OPENAI_API_KEY").context("'$OPENAI_API_KEY' is not set")?;
    let model = env::var("CAPTION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let config = BatchConfig::from_env()?;
    debug!("batch config: {:?}", config);

    let loader = Arc::new(ModelLoader::new(model.clone(), move || {
        let (base_url, api_key, model) = (base_url.clone(), api_key.clone(), model.clone());
        async move { OpenAICaption::new(&base_url, &api_key, &model) }
    }));

    // the first batch joins this load if it is still in flight
    let preload = tokio::spawn({
        let loader = loader.clone();
        async move {
            // failure is already logged, the first batch will try again
            let _ = loader.preload().await;
        }
    });

    let scheduler = BatchScheduler::new(loader, config);

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (index, image) in images.iter().enumerate() {
        let sink = Arc::new(ImageSink::new(index, image, tx.clone()));
        scheduler.add_task(sink, image.as_str(), None);
    }
    // the channel closes once every sink is gone
    drop(tx);

    let mut results: Vec<Option<CaptionStatus>> = vec![None; images.len()];
    let mut remaining = images.len();
    while remaining > 0 {
        match rx.recv().await {
            Some((index, status)) => {
                if status.is_terminal() && results[index].is_none() {
                    results[index] = Some(status);
                    remaining -= 1;
                }
            }
            None => break,
        }
    }

    let mut failed = 0;
    for (image, status) in images.iter().zip(results) {
        match status {
            Some(CaptionStatus::Captioned(caption)) => println!("{}\t{}", image, caption),
            Some(status) => {
                failed += 1;
                println!("{}\t{}", image, status);
            }
            None => {
                failed += 1;
                println!("{}\tno caption", image);
            }
        }
    }

    drop(scheduler);
    if let Err(e) = preload.await {
        error!("preload task failed: {}", e);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} images failed", failed, images.len());
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            // load filters from the `RUST_LOG` environment variable.
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caption_cli=info,caption_pool=info,ai=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .init();
}
