pub mod anthropic;
pub mod echo;
pub mod openrouter;

pub use anthropic::AnthropicProvider;
pub use echo::EchoProvider;
pub use openrouter::OpenRouterProvider;
