use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider to constrain output to a single JSON object.
    pub json_response: bool,
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for LLM operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The provider refused the request outright (bad key, bad model, bad payload).
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Trait for LLM providers (OpenAI, Claude, Gemini, etc.)
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Scripted provider for testing.
///
/// Replies are consumed in order; once the script runs dry every call gets
/// the fallback text. Every request is recorded for later inspection.
#[derive(Debug)]
pub struct MockProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: response.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that plays back `replies` before falling back to `fallback`.
    pub fn scripted(
        replies: impl IntoIterator<Item = Result<String, LlmError>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback: fallback.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// All requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        Box::pin(async move {
            next.map(|content| CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 20,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            max_tokens: 100,
            temperature: 0.7,
            json_response: true,
        }
    }

    #[tokio::test]
    async fn mock_provider_returns_response() {
        let mock = MockProvider::new("hello steward");
        let resp = mock.complete(request("hi")).await.unwrap();
        assert_eq!(resp.content, "hello steward");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests()[0].messages[0].content, "hi");
    }

    #[tokio::test]
    async fn scripted_mock_plays_in_order_then_falls_back() {
        let mock = MockProvider::scripted(
            [Err(LlmError::RateLimited), Ok("first".to_string())],
            "rest",
        );
        assert_eq!(mock.complete(request("a")).await.unwrap_err(), LlmError::RateLimited);
        assert_eq!(mock.complete(request("b")).await.unwrap().content, "first");
        assert_eq!(mock.complete(request("c")).await.unwrap().content, "rest");
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn rejected_requests_are_not_retryable() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Unavailable("503".into()).is_retryable());
        assert!(LlmError::RequestFailed("reset".into()).is_retryable());
        assert!(!LlmError::Rejected { status: 401, body: "bad key".into() }.is_retryable());
    }
}
