pub mod config;
pub mod http;
pub mod metadata;

pub use config::ProviderConfig;
pub use metadata::{LLMProvider, LLMStream, ProviderMetadata};
