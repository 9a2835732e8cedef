use async_trait::async_trait;
use futures::StreamExt;
use hive_llm::{
    ChatMessage, ChatOptions, ChatResponse, LLMError, LLMProvider, ProviderMetadata, StreamChunk,
    Usage,
};
use std::sync::Mutex;

/// Scripted provider: hands out canned replies in order and records every
/// conversation it was shown.
pub struct MockLLMProvider {
    replies: Mutex<Vec<Result<String, LLMError>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    metadata: ProviderMetadata,
}

impl MockLLMProvider {
    pub fn new(replies: Vec<Result<String, LLMError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            seen: Mutex::new(Vec::new()),
            metadata: ProviderMetadata {
                id: "mock".to_string(),
                name: "Mock Provider".to_string(),
                default_model: "mock-model".to_string(),
            },
        }
    }

    pub fn with_text_response(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn failing() -> Self {
        Self::new(vec![Err(LLMError::Api {
            status: 500,
            message: "upstream exploded".to_string(),
        })])
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> hive_llm::Result<ChatResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok("Mock response".to_string()))?;
        Ok(ChatResponse {
            content: next,
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.metadata.default_model.clone()),
            stop_reason: "end_turn".to_string(),
            usage: Usage::default(),
        })
    }
}

#[tokio::test]
async fn test_mock_provider_text_response() {
    let mock = MockLLMProvider::with_text_response("Hello");
    let reply = mock
        .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(reply.content, "Hello");
    assert_eq!(reply.model, "mock-model");
    assert_eq!(mock.calls(), vec![vec![ChatMessage::user("hi")]]);
}

#[tokio::test]
async fn test_mock_provider_replies_in_order() {
    let mock = MockLLMProvider::new(vec![Ok("one".to_string()), Ok("two".to_string())]);
    let options = ChatOptions::default().with_model("override");

    let first = mock.chat(&[ChatMessage::user("a")], &options).await.unwrap();
    let second = mock.chat(&[ChatMessage::user("b")], &options).await.unwrap();

    assert_eq!(first.content, "one");
    assert_eq!(second.content, "two");
    assert_eq!(second.model, "override");
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn test_default_stream_wraps_chat() {
    let mock = MockLLMProvider::with_text_response("streamed");
    let chunks: Vec<StreamChunk> = mock
        .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], StreamChunk::Content("streamed".to_string()));
    assert!(chunks[1].is_done());
}

#[tokio::test]
async fn test_failure_surfaces_in_stream() {
    let mock = MockLLMProvider::failing();
    let mut stream = mock
        .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert!(matches!(first, Err(LLMError::Api { status: 500, .. })));
    assert!(stream.next().await.is_none());
}
