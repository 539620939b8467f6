use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::accumulator::StreamAccumulator;
use crate::adapter::AdaptedTurn;
use crate::models::tool::ToolInvocation;
use crate::providers::base::{ChunkStream, ModelHandle, StreamChunk};

/// Receives the live side of a streaming session
#[async_trait]
pub trait StreamObserver: Send + Sync {
    /// Called after every chunk with all text received so far
    async fn on_progress(&self, text: &str) -> Result<()>;

    /// A tokens-per-second sample, at most once per rate window
    async fn on_rate(&self, tokens_per_second: f64);

    /// The session stopped because the cancellation token fired
    async fn on_cancelled(&self) -> Result<()>;
}

/// Result of one streaming generation
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub text: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub citations: Option<Value>,
    pub token_count: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl StreamOutcome {
    pub fn tokens_per_second(&self) -> Option<f64> {
        let seconds = self.elapsed.as_secs_f64();
        (seconds > 0.0).then(|| self.token_count as f64 / seconds)
    }

    /// Fold an earlier round into this one. Tokens and time add up; the text stays this
    /// round's and citations fall back to the earlier round's.
    pub fn after(mut self, earlier: StreamOutcome) -> Self {
        self.token_count += earlier.token_count;
        self.elapsed += earlier.elapsed;
        self.citations = self.citations.or(earlier.citations);
        self
    }
}

enum Step {
    Cancelled,
    Chunk(Result<StreamChunk>),
    End,
}

/// Drives one generation at a time against a model handle, accumulating its output and
/// reporting progress to the observer
pub struct StreamingSession {
    observer: Arc<dyn StreamObserver>,
    cancel: CancellationToken,
    rate_window: Duration,
    known_tools: Vec<String>,
}

impl StreamingSession {
    pub fn new(
        observer: Arc<dyn StreamObserver>,
        cancel: CancellationToken,
        rate_window: Duration,
    ) -> Self {
        Self {
            observer,
            cancel,
            rate_window,
            known_tools: Vec::new(),
        }
    }

    /// Tool names accepted when recovering calls written into the reply text
    pub fn with_known_tools(mut self, known_tools: Vec<String>) -> Self {
        self.known_tools = known_tools;
        self
    }

    /// Run a single generation over `turns`.
    ///
    /// A provider error ends the session with `Err` and is not retried here: part of the
    /// stream has already been consumed. Cancellation is checked before every chunk and
    /// yields an outcome with `cancelled` set.
    pub async fn run(
        &self,
        turns: &[AdaptedTurn],
        model: &dyn ModelHandle,
    ) -> Result<StreamOutcome> {
        let started = Instant::now();
        let mut accumulator = StreamAccumulator::new(self.rate_window);

        if self.cancel.is_cancelled() {
            return self.cancelled(accumulator, started).await;
        }

        let mut chunks = self.open(turns, model).await?;

        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                next = chunks.next() => match next {
                    Some(chunk) => Step::Chunk(chunk),
                    None => Step::End,
                },
            };

            let chunk = match step {
                Step::Cancelled => return self.cancelled(accumulator, started).await,
                Step::End => break,
                Step::Chunk(chunk) => chunk.context("provider stream failed")?,
            };

            if self.cancel.is_cancelled() {
                return self.cancelled(accumulator, started).await;
            }

            accumulator.push(chunk);
            self.observer.on_progress(accumulator.text()).await?;
            if let Some(rate) = accumulator.sample_rate() {
                self.observer.on_rate(rate).await;
            }
        }

        let elapsed = started.elapsed();
        let done = accumulator.finish(&self.known_tools);
        tracing::debug!(
            tokens = done.token_count,
            tool_calls = done.tool_invocations.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "stream finished"
        );

        Ok(StreamOutcome {
            text: done.text,
            tool_invocations: done.tool_invocations,
            citations: done.citations,
            token_count: done.token_count,
            elapsed,
            cancelled: false,
        })
    }

    async fn open(&self, turns: &[AdaptedTurn], model: &dyn ModelHandle) -> Result<ChunkStream> {
        if model.supports_streaming() {
            return model.stream(turns).await;
        }

        let response = model.invoke(turns).await?;
        Ok(Box::pin(stream::once(async move {
            Ok(StreamChunk::from(response))
        })))
    }

    async fn cancelled(
        &self,
        accumulator: StreamAccumulator,
        started: Instant,
    ) -> Result<StreamOutcome> {
        tracing::info!("stream cancelled");
        self.observer.on_cancelled().await?;

        Ok(StreamOutcome {
            text: accumulator.text().to_string(),
            tool_invocations: Vec::new(),
            citations: None,
            token_count: accumulator.token_count(),
            elapsed: started.elapsed(),
            cancelled: true,
        })
    }
}
