//! Metered chat completion.
//!
//! Sends one chat completion through the metering client and waits for the
//! usage event to reach the collector before exiting.
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! export REVENIUM_METERING_API_KEY=hak_...
//! cargo run --example chat_metered
//! ```

#![allow(clippy::print_stdout)]

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
        .with_metadata(
            UsageMetadata::new()
                .organization_id("acme-corp")
                .product_id("support-bot")
                .task_type("faq")
                .subscriber(&Subscriber::new("user-123").email("user@example.com")),
        )
        .completions();

    let request = ChatCompletionRequest::new("gpt-4o-mini")
        .system("You are a helpful assistant. Keep answers concise.")
        .user("What is the capital of France?");

    let response = completions
        .create_with_metadata(&request, Some(&UsageMetadata::new().trace_id("example-trace")))
        .await?;

    println!("{}", response.text().unwrap_or_default());
    if let Some(usage) = response.usage {
        println!(
            "tokens: {} in, {} out, {} total",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    client.close().await;
    Ok(())
}
