use hive_llm::LLMError;
use hive_session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("provider error: {0}")]
    Provider(#[from] LLMError),

    #[error("message must not be empty")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, TurnError>;
