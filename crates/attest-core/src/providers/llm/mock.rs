use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::LlmProvider;
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse};

type MatchFn = dyn Fn(&CompletionRequest) -> Option<CompletionResponse> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Call `i` returns `responses[i mod len]`; never exhausts.
    #[default]
    Cycling,
    /// Call `i` returns `responses[i]` exactly once; past the end every call
    /// fails with an exhaustion error.
    Replay,
}

/// Configurable in-process provider for tests and offline runs.
///
/// Selection order per call: injected error at the call index, then the
/// match predicate, then index-based selection per [`MockMode`]. The call
/// counter and history live under one mutex; configuration is immutable
/// after construction.
pub struct MockProvider {
    mode: MockMode,
    responses: Vec<CompletionResponse>,
    errors: Vec<Option<ProviderError>>,
    match_fn: Option<Box<MatchFn>>,
    latency: Option<Duration>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    calls: usize,
    history: Vec<CompletionRequest>,
}

impl MockProvider {
    pub fn cycling(responses: Vec<CompletionResponse>) -> Self {
        Self {
            mode: MockMode::Cycling,
            responses,
            errors: Vec::new(),
            match_fn: None,
            latency: None,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn replay(responses: Vec<CompletionResponse>) -> Self {
        Self {
            mode: MockMode::Replay,
            ..Self::cycling(responses)
        }
    }

    /// Cycling mock over plain-text responses.
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::cycling(texts.iter().map(|t| CompletionResponse::text(*t)).collect())
    }

    /// Inject an error returned at call index `i` whenever `errors[i]` is
    /// set, before any response selection.
    pub fn with_errors(mut self, errors: Vec<Option<ProviderError>>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_error_at(mut self, index: usize, err: ProviderError) -> Self {
        if self.errors.len() <= index {
            self.errors.resize(index + 1, None);
        }
        self.errors[index] = Some(err);
        self
    }

    pub fn with_match_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Option<CompletionResponse> + Send + Sync + 'static,
    {
        self.match_fn = Some(Box::new(f));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Independent copy of every request seen so far.
    pub fn history(&self) -> Vec<CompletionRequest> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.history.push(request.clone());
            let index = state.calls;
            state.calls += 1;

            if let Some(Some(err)) = self.errors.get(index) {
                Err(err.clone())
            } else if let Some(matched) = self.match_fn.as_ref().and_then(|f| f(request)) {
                Ok(matched)
            } else {
                match self.mode {
                    MockMode::Cycling => {
                        if self.responses.is_empty() {
                            Err(ProviderError::Other("mock has no responses configured".into()))
                        } else {
                            Ok(self.responses[index % self.responses.len()].clone())
                        }
                    }
                    MockMode::Replay => self.responses.get(index).cloned().ok_or(
                        ProviderError::Exhausted {
                            consumed: self.responses.len(),
                        },
                    ),
                }
            }
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".into(),
            system_prompt: None,
            messages: vec![crate::model::ChatMessage::user(content)],
            temperature: 0.0,
            max_tokens: 16,
        }
    }

    #[tokio::test]
    async fn cycling_wraps_around() {
        let mock = MockProvider::from_texts(&["A", "B"]);
        for expected in ["A", "B", "A", "B", "A"] {
            let resp = mock.complete(&request("hi")).await.unwrap();
            assert_eq!(resp.content, expected);
        }
    }

    #[tokio::test]
    async fn replay_exhausts_after_configured_responses() {
        let mock = MockProvider::replay(vec![
            CompletionResponse::text("A"),
            CompletionResponse::text("B"),
        ]);
        assert_eq!(mock.complete(&request("1")).await.unwrap().content, "A");
        assert_eq!(mock.complete(&request("2")).await.unwrap().content, "B");
        let err = mock.complete(&request("3")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted { consumed: 2 }));
    }

    #[tokio::test]
    async fn injected_error_takes_precedence_over_match_fn() {
        let mock = MockProvider::from_texts(&["A"])
            .with_error_at(
                0,
                ProviderError::RateLimited {
                    provider: "mock".into(),
                    detail: "injected".into(),
                },
            )
            .with_match_fn(|_| Some(CompletionResponse::text("matched")));

        let err = mock.complete(&request("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        // The next call has no injected error; the match now wins.
        let resp = mock.complete(&request("hi")).await.unwrap();
        assert_eq!(resp.content, "matched");
    }

    #[tokio::test]
    async fn match_fn_shadows_index_selection() {
        let mock = MockProvider::from_texts(&["A"]).with_match_fn(|req| {
            req.messages
                .iter()
                .any(|m| m.content.contains("special"))
                .then(|| CompletionResponse::text("matched"))
        });
        assert_eq!(mock.complete(&request("plain")).await.unwrap().content, "A");
        assert_eq!(
            mock.complete(&request("special")).await.unwrap().content,
            "matched"
        );
    }

    #[tokio::test]
    async fn match_fn_shadows_replay_exhaustion() {
        let mock = MockProvider::replay(vec![])
            .with_match_fn(|_| Some(CompletionResponse::text("matched")));
        assert_eq!(mock.complete(&request("x")).await.unwrap().content, "matched");
    }

    #[tokio::test]
    async fn history_is_a_defensive_copy() {
        let mock = MockProvider::from_texts(&["A"]);
        mock.complete(&request("first")).await.unwrap();
        let mut copied = mock.history();
        copied.clear();
        assert_eq!(mock.history().len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_the_response() {
        let mock =
            MockProvider::from_texts(&["A"]).with_latency(Duration::from_millis(250));
        let started = tokio::time::Instant::now();
        mock.complete(&request("hi")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
