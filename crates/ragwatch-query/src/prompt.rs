//! Prompt assembly.

use async_trait::async_trait;
use ragwatch_core::{Generator, ProviderError};

/// Instruction line placed before the retrieved documents.
pub const INSTRUCTION: &str = "Answer the following question based on the provided documents:";

/// Assemble the user prompt from the query and the ranked chunk texts.
#[must_use]
pub fn build_prompt(query: &str, context: &[&str]) -> String {
    format!(
        "{INSTRUCTION}\n\nDocuments:\n{}\n\nQuestion: {query}\nAnswer:",
        context.join("\n\n")
    )
}

/// Generator that answers with the prompt it would have sent.
///
/// Lets the whole query path run offline and makes the retrieved context
/// visible to the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptEchoGenerator;

impl PromptEchoGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for PromptEchoGenerator {
    fn model_name(&self) -> &str {
        "prompt-echo"
    }

    async fn generate(&self, query: &str, context: &[&str]) -> Result<String, ProviderError> {
        Ok(build_prompt(query, context))
    }
}
