pub mod connection;
pub mod endpoints;
pub mod stream;

pub use connection::ApiConnectionError;
pub use endpoints::{ChatCompletionRequest, ChatMessage, Provider, DEFAULT_CHAT_MODEL};
