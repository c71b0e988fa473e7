//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use revenium_openai::prelude::*;
//! ```

pub use crate::backend::{ChatBackend, ChunkStream, MockBackend, MockReply, OpenAIBackend, SharedBackend};
pub use crate::client::{Chat, ReveniumOpenAI};
pub use crate::completions::Completions;
pub use crate::config::{Config, FallbackPolicy};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::metadata::{Subscriber, UsageMetadata};
pub use crate::metering::{MeteringClient, MeteringEvent, RetryPolicy};
pub use crate::provider::Provider;
pub use crate::stop_reason::StopReason;
pub use crate::streaming::{MeteredStream, StreamAccumulator, StreamProgress};
pub use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, Choice, ChunkChoice,
    ChunkDelta, ResponseMessage,
};
pub use crate::usage::CompletionUsage;
