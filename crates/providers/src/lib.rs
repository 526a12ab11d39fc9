//! Model provider implementations for taskforge.
//!
//! All providers implement the `taskforge_core::Provider` trait.
//! [`router::build_from_config`] assembles the stack the config describes.

pub mod fallback;
pub mod openai_compat;
pub mod router;

pub use fallback::FallbackProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
