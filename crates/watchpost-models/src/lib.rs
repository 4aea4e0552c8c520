//! Model collaborators: the vision and reasoning traits, their prompts and
//! an OpenAI-compatible chat-completions client

mod client;
mod error;
mod prompts;

pub use client::{extract_content, OpenAiCompatClient};
pub use error::ModelError;
pub use prompts::{reasoning_prompt, VISION_PROMPT};

use std::future::Future;

/// Multimodal stage: image plus instruction in, free-form text out
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;

    /// `image` is a `data:image/jpeg;base64,...` URL
    fn describe(
        &self,
        prompt: &str,
        image: &str,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// Text stage: prompt in, free-form text out
pub trait ReasoningModel: Send + Sync {
    fn name(&self) -> &str;

    fn reason(&self, prompt: &str) -> impl Future<Output = Result<String, ModelError>> + Send;
}
