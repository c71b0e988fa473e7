//! Metered streaming chat completion.
//!
//! Prints tokens as they arrive. The usage event is dispatched when the
//! stream is closed.
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! export REVENIUM_METERING_API_KEY=hak_...
//! cargo run --example stream_metered
//! ```

#![allow(clippy::print_stdout)]

use std::io::{Write, stdout};

use futures::StreamExt;
use revenium_openai::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let client = ReveniumOpenAI::new(config)?;
    let completions = client
        .with_metadata(UsageMetadata::new().task_type("poetry").agent("haiku-writer"))
        .completions();

    let request = ChatCompletionRequest::new("gpt-4o-mini")
        .system("You are a creative poet.")
        .user("Write a haiku about Rust.");

    let mut stream = completions.create_stream(&request).await?;
    while let Some(chunk) = stream.next().await {
        if let Some(text) = chunk?.text() {
            print!("{text}");
            stdout().flush()?;
        }
    }

    let totals = stream.progress().snapshot();
    stream.close()?;
    println!("\n\n{} tokens total", totals.usage().total_tokens);

    client.close().await;
    Ok(())
}
