use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::adapter;
use crate::config::Settings;
use crate::errors::ProviderFailure;
use crate::models::tool::{ToolCall, ToolInvocation};
use crate::models::turn::{Attachments, ConversationTurn, TurnContent, TurnPatch, TurnStatus};
use crate::providers::base::ModelHandle;
use crate::providers::profile::ProviderProfile;
use crate::publisher::{publish_or_log, ProgressEvent, ProgressPublisher};
use crate::store::{ConversationStore, StoreError};
use crate::stream::{StreamObserver, StreamOutcome, StreamingSession};
use crate::tools::{self, ToolExecutor};

/// A user message to answer
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    pub thread_id: String,
    /// Client-supplied id. A turn with this id that is already stored is not added again.
    pub message_id: Option<String>,
    pub content: TurnContent,
    pub attachments: Option<Attachments>,
}

impl ProcessRequest {
    pub fn new<S: Into<String>, C: Into<TurnContent>>(thread_id: S, content: C) -> Self {
        Self {
            thread_id: thread_id.into(),
            message_id: None,
            content: content.into(),
            attachments: None,
        }
    }

    pub fn with_message_id<S: Into<String>>(mut self, message_id: S) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

/// Persists and publishes the progress of one assistant turn
struct TurnObserver {
    store: Arc<dyn ConversationStore>,
    publisher: Arc<dyn ProgressPublisher>,
    thread_id: String,
    message_id: String,
}

impl TurnObserver {
    fn publish(&self, event: ProgressEvent) {
        publish_or_log(self.publisher.as_ref(), &self.thread_id, event);
    }

    fn publish_status(&self, status: TurnStatus) {
        self.publish(ProgressEvent::Status {
            message_id: self.message_id.clone(),
            status,
        });
    }

    async fn persist(&self, patch: TurnPatch) -> Result<ConversationTurn> {
        Ok(self
            .store
            .update_message(&self.thread_id, &self.message_id, patch)
            .await?)
    }

    async fn load(&self) -> Result<ConversationTurn> {
        let turns = self.store.get_thread_messages(&self.thread_id).await?;
        let turn = turns
            .into_iter()
            .find(|turn| turn.id == self.message_id)
            .ok_or_else(|| StoreError::MessageNotFound(self.message_id.clone()))?;
        Ok(turn)
    }
}

#[async_trait]
impl StreamObserver for TurnObserver {
    async fn on_progress(&self, text: &str) -> Result<()> {
        self.persist(TurnPatch::content(text)).await?;
        self.publish(ProgressEvent::MessageUpdate {
            message_id: self.message_id.clone(),
            content: text.to_string(),
        });
        Ok(())
    }

    async fn on_rate(&self, tokens_per_second: f64) {
        self.publish(ProgressEvent::TokenRate {
            message_id: self.message_id.clone(),
            tokens_per_second,
        });
    }

    async fn on_cancelled(&self) -> Result<()> {
        self.persist(TurnPatch::status(TurnStatus::Cancelled)).await?;
        self.publish_status(TurnStatus::Cancelled);
        Ok(())
    }
}

/// Coordinates answering a user message: persisting turns, streaming the reply, running
/// requested tools and a single continuation round, and reporting failures on the turn
pub struct SessionController {
    store: Arc<dyn ConversationStore>,
    model: Arc<dyn ModelHandle>,
    executor: Arc<dyn ToolExecutor>,
    publisher: Arc<dyn ProgressPublisher>,
    profile: ProviderProfile,
    system_prompt: String,
    known_tools: Vec<String>,
    rate_window: Duration,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        model: Arc<dyn ModelHandle>,
        executor: Arc<dyn ToolExecutor>,
        publisher: Arc<dyn ProgressPublisher>,
        profile: ProviderProfile,
    ) -> Self {
        Self {
            store,
            model,
            executor,
            publisher,
            profile,
            system_prompt: String::new(),
            known_tools: Vec::new(),
            rate_window: Duration::from_secs(1),
        }
    }

    /// A controller configured from loaded settings. A host without its own transport can
    /// pass the publisher from `settings.stream.publisher()`.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn ConversationStore>,
        model: Arc<dyn ModelHandle>,
        executor: Arc<dyn ToolExecutor>,
        publisher: Arc<dyn ProgressPublisher>,
    ) -> Self {
        Self::new(store, model, executor, publisher, settings.profile())
            .with_system_prompt(settings.agent.system_prompt.clone())
            .with_known_tools(settings.agent.known_tools.clone())
            .with_rate_window(settings.stream.rate_window())
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_known_tools(mut self, known_tools: Vec<String>) -> Self {
        self.known_tools = known_tools;
        self
    }

    pub fn with_rate_window(mut self, rate_window: Duration) -> Self {
        self.rate_window = rate_window;
        self
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Answer a user message and return the final assistant turn.
    ///
    /// Provider failures do not surface as `Err`: the turn is returned `cancelled` with a
    /// description of the failure appended to its content. `Err` means the store itself
    /// could not be written.
    pub async fn process_message(
        &self,
        request: ProcessRequest,
        cancel: CancellationToken,
    ) -> Result<ConversationTurn> {
        self.persist_user_turn(&request).await?;

        let placeholder = ConversationTurn::assistant().with_status(TurnStatus::Processing);
        let observer = Arc::new(TurnObserver {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            thread_id: request.thread_id.clone(),
            message_id: placeholder.id.clone(),
        });
        self.store.add_message(&request.thread_id, placeholder).await?;
        observer.publish_status(TurnStatus::Processing);

        match self.generate(&observer, &cancel).await {
            Ok(turn) => Ok(turn),
            Err(error) => self.fail(&observer, error).await,
        }
    }

    async fn persist_user_turn(&self, request: &ProcessRequest) -> Result<()> {
        if let Some(id) = &request.message_id {
            let existing = self.store.get_thread_messages(&request.thread_id).await?;
            if existing.iter().any(|turn| &turn.id == id) {
                tracing::debug!(
                    thread_id = %request.thread_id,
                    message_id = %id,
                    "user turn already stored"
                );
                return Ok(());
            }
        }

        let mut turn = ConversationTurn::user().with_content(request.content.clone());
        if let Some(id) = &request.message_id {
            turn = turn.with_id(id.clone());
        }
        if let Some(attachments) = request.attachments.clone().filter(|a| !a.is_empty()) {
            turn = turn.with_attachments(attachments);
        }

        self.store.add_message(&request.thread_id, turn).await?;
        Ok(())
    }

    async fn generate(
        &self,
        observer: &Arc<TurnObserver>,
        cancel: &CancellationToken,
    ) -> Result<ConversationTurn> {
        let history: Vec<ConversationTurn> = self
            .store
            .get_thread_messages(&observer.thread_id)
            .await?
            .into_iter()
            .filter(|turn| turn.id != observer.message_id)
            .collect();
        let adapted = adapter::adapt(&history, &self.profile, &self.system_prompt);

        let tools = self.executor.tools();
        let model = if self.profile.tool_binding_supported && !tools.is_empty() {
            self.model.bind_tools(&tools)?
        } else {
            self.model.clone()
        };

        let mut known_tools = self.known_tools.clone();
        for tool in &tools {
            if !known_tools.contains(&tool.name) {
                known_tools.push(tool.name.clone());
            }
        }

        let session = StreamingSession::new(observer.clone(), cancel.clone(), self.rate_window)
            .with_known_tools(known_tools);

        tracing::info!(
            thread_id = %observer.thread_id,
            message_id = %observer.message_id,
            provider = %self.profile.kind,
            turns = adapted.len(),
            "starting generation"
        );

        let first = session.run(&adapted, model.as_ref()).await?;
        if first.cancelled {
            return observer.load().await;
        }
        if first.tool_invocations.is_empty() {
            return self.complete(observer, first).await;
        }

        observer.publish_status(TurnStatus::Processing);
        let calls: Vec<ToolCall> = first
            .tool_invocations
            .iter()
            .filter_map(|invocation| invocation.tool_call.as_ref().ok().cloned())
            .collect();
        observer.publish(ProgressEvent::ToolCalls {
            message_id: observer.message_id.clone(),
            calls,
        });

        let outcomes =
            tools::execute_all(self.executor.as_ref(), &first.tool_invocations, cancel).await;
        let parsed: Vec<ToolInvocation> = first
            .tool_invocations
            .iter()
            .filter(|invocation| invocation.tool_call.is_ok())
            .cloned()
            .collect();
        let record = TurnPatch {
            tool_calls: Some(parsed),
            tool_results: Some(outcomes.clone()),
            ..Default::default()
        };

        if cancel.is_cancelled() {
            observer.on_cancelled().await?;
            return observer.persist(record).await;
        }
        observer.persist(record).await?;

        let follow_up = tools::follow_up_text(&outcomes);
        let turns = adapter::continuation_turns(&adapted, &first.text, &follow_up, &self.profile);
        tracing::info!(
            thread_id = %observer.thread_id,
            message_id = %observer.message_id,
            tools = outcomes.len(),
            round = 2,
            "continuing with tool results"
        );

        let second = session.run(&turns, model.as_ref()).await?;
        if second.cancelled {
            return observer.load().await;
        }
        if !second.tool_invocations.is_empty() {
            tracing::warn!(
                message_id = %observer.message_id,
                count = second.tool_invocations.len(),
                "tool calls from the continuation round are not executed"
            );
        }

        self.complete(observer, second.after(first)).await
    }

    /// Persist the final text, with the token rate of every round folded into `outcome`
    async fn complete(
        &self,
        observer: &TurnObserver,
        outcome: StreamOutcome,
    ) -> Result<ConversationTurn> {
        let turn = observer
            .persist(TurnPatch {
                content: Some(TurnContent::Text(outcome.text.clone())),
                status: Some(TurnStatus::Completed),
                citations: outcome.citations.clone(),
                ..Default::default()
            })
            .await?;

        if let Some(rate) = outcome.tokens_per_second() {
            observer.on_rate(rate).await;
        }
        observer.publish(ProgressEvent::MessageUpdate {
            message_id: observer.message_id.clone(),
            content: outcome.text,
        });
        observer.publish_status(TurnStatus::Completed);

        tracing::info!(
            thread_id = %observer.thread_id,
            message_id = %observer.message_id,
            tokens = outcome.token_count,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "generation completed"
        );
        Ok(turn)
    }

    async fn fail(
        &self,
        observer: &TurnObserver,
        error: anyhow::Error,
    ) -> Result<ConversationTurn> {
        let failure = ProviderFailure::from_error(&error);
        tracing::error!(
            thread_id = %observer.thread_id,
            message_id = %observer.message_id,
            failure = %failure,
            "generation failed: {:#}",
            error
        );

        let message = failure.user_message();
        let existing = observer
            .load()
            .await
            .map(|turn| turn.content.to_text())
            .unwrap_or_default();
        let content = if existing.trim().is_empty() {
            message.clone()
        } else {
            format!("{}\n\n{}", existing, message)
        };

        let turn = observer
            .persist(TurnPatch::content(content).with_status(TurnStatus::Cancelled))
            .await?;
        observer.publish(ProgressEvent::Error {
            message_id: observer.message_id.clone(),
            message,
        });
        observer.publish_status(TurnStatus::Cancelled);
        Ok(turn)
    }
}
