use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;

use crate::adapter::AdaptedTurn;
use crate::models::tool::Tool;
use crate::providers::base::{ChunkStream, ModelHandle, ModelResponse, StreamChunk};

/// One scripted generation: the chunks to yield, optionally followed by a stream error
#[derive(Debug, Clone, Default)]
pub struct MockRound {
    pub chunks: Vec<StreamChunk>,
    pub error: Option<String>,
}

impl MockRound {
    pub fn new(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks,
            error: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(vec![StreamChunk::text(text)])
    }

    pub fn failing(chunks: Vec<StreamChunk>, error: &str) -> Self {
        Self {
            chunks,
            error: Some(error.to_string()),
        }
    }
}

/// A mock model that plays back pre-configured rounds for testing
#[derive(Clone)]
pub struct MockModel {
    rounds: Arc<Mutex<Vec<MockRound>>>,
    requests: Arc<Mutex<Vec<Vec<AdaptedTurn>>>>,
    bound_tools: Arc<Mutex<Vec<Tool>>>,
    streaming: bool,
}

impl MockModel {
    /// Create a new mock model with a sequence of rounds
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds)),
            requests: Arc::new(Mutex::new(Vec::new())),
            bound_tools: Arc::new(Mutex::new(Vec::new())),
            streaming: true,
        }
    }

    /// A model that only answers through `invoke`
    pub fn non_streaming(rounds: Vec<MockRound>) -> Self {
        Self {
            streaming: false,
            ..Self::new(rounds)
        }
    }

    /// Every turn list the model was called with, in call order
    pub fn requests(&self) -> Vec<Vec<AdaptedTurn>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bound_tools(&self) -> Vec<Tool> {
        self.bound_tools.lock().unwrap().clone()
    }

    fn next_round(&self, turns: &[AdaptedTurn]) -> MockRound {
        self.requests.lock().unwrap().push(turns.to_vec());
        let mut rounds = self.rounds.lock().unwrap();
        if rounds.is_empty() {
            // An exhausted script answers with an empty generation
            MockRound::default()
        } else {
            rounds.remove(0)
        }
    }
}

#[async_trait]
impl ModelHandle for MockModel {
    async fn stream(&self, turns: &[AdaptedTurn]) -> Result<ChunkStream> {
        let round = self.next_round(turns);
        let mut items: Vec<Result<StreamChunk>> = round.chunks.into_iter().map(Ok).collect();
        if let Some(error) = round.error {
            items.push(Err(anyhow!(error)));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn invoke(&self, turns: &[AdaptedTurn]) -> Result<ModelResponse> {
        let round = self.next_round(turns);
        if let Some(error) = round.error {
            return Err(anyhow!(error));
        }

        let mut response = ModelResponse::default();
        let mut text = String::new();
        for chunk in round.chunks {
            if let Some(part) = chunk.content.as_str() {
                text.push_str(part);
            }
            response.tool_calls.extend(chunk.tool_calls);
            if chunk.citations.is_some() {
                response.citations = chunk.citations;
            }
        }
        response.content = serde_json::Value::String(text);
        Ok(response)
    }

    fn bind_tools(&self, tools: &[Tool]) -> Result<Arc<dyn ModelHandle>> {
        *self.bound_tools.lock().unwrap() = tools.to_vec();
        Ok(Arc::new(self.clone()))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}
