//! Retrieval and answer generation for ragwatch.
//!
//! [`RetrievalCoordinator`] embeds the query, searches the catalog, resolves
//! hits to their stored chunk text and hands that text to a
//! [`Generator`](ragwatch_core::Generator).
//!
//! | Generator | Notes |
//! |-----------|-------|
//! | [`PromptEchoGenerator`] | Offline; returns the assembled prompt |
//! | [`OpenAiGenerator`] | OpenAI-compatible `/chat/completions` |

pub mod coordinator;
pub mod openai;
pub mod prompt;

pub use coordinator::RetrievalCoordinator;
pub use openai::OpenAiGenerator;
pub use prompt::{build_prompt, PromptEchoGenerator};
