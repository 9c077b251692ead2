//! HTTP clients for the model-serving collaborators.
//!
//! [`HttpCompletionClient`] talks to an OpenAI-compatible completions
//! endpoint, [`HttpEmbedder`] to an Ollama-style embeddings endpoint, and
//! [`SqlCache`] short-circuits repeat SQL generations.

pub mod cache;
pub mod completion;
pub mod embedding;

pub use cache::SqlCache;
pub use completion::HttpCompletionClient;
pub use embedding::HttpEmbedder;
