// Generation module
// Prompt assembly and the language-model seam used to answer questions

pub mod prompt;

use anyhow::Result;

pub use prompt::{PromptAssembler, PromptConfig, PromptLocale, PromptTemplate};

/// A language model that turns an assembled prompt into an answer.
///
/// Calls are single-shot and blocking. Implementations must not retry or
/// impose their own deadline; both belong to the caller.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
