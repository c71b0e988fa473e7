//! Revenium metering middleware for OpenAI and Azure OpenAI.
//!
//! Wraps chat completions (plain and streaming) and reports one usage event
//! per call to the Revenium collector. Metering runs on background tasks and
//! never changes what the caller receives: provider responses and errors pass
//! through untouched, and metering failures are only logged.
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use revenium_openai::prelude::*;
//!
//! let client = ReveniumOpenAI::from_env()?;
//! let completions = client
//!     .with_metadata(UsageMetadata::new().organization_id("acme").task_type("chat"))
//!     .completions();
//!
//! let request = ChatCompletionRequest::new("gpt-4o-mini").user("Tell me a joke");
//! let mut stream = completions.create_stream(&request).await?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?.text().unwrap_or_default());
//! }
//! stream.close()?;
//!
//! client.close().await;
//! ```

pub mod backend;
pub mod client;
pub mod completions;
pub mod config;
pub mod error;
pub mod metadata;
pub mod metering;
pub mod prelude;
pub mod provider;
pub mod stop_reason;
pub mod streaming;
pub mod types;
pub mod usage;

pub use client::{Chat, ReveniumOpenAI};
pub use completions::Completions;
pub use config::{Config, FallbackPolicy};
pub use error::{Error, ErrorKind, Result};
pub use metadata::{Subscriber, UsageMetadata};
pub use provider::Provider;
pub use stop_reason::StopReason;
pub use streaming::MeteredStream;
pub use types::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage};
pub use usage::CompletionUsage;
