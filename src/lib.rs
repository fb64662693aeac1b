// Shortsmith - Automated short-form fact video generator
//
// Library surface: configuration, the shared LLM client, and the
// acceptance pipeline with its collaborator implementations.

pub mod config;
pub mod llm;
pub mod pipeline;
