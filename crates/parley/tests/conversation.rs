use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use parley::{
    adapter::{adapt, AdaptedTurn},
    config::Settings,
    models::{
        role::Role,
        tool::Tool,
        turn::{ConversationTurn, TurnStatus},
    },
    providers::{
        base::{ChunkStream, ModelHandle, ModelResponse, StreamChunk},
        factory::resolve_profile,
    },
    publisher::{ChannelPublisher, ProgressEvent},
    store::{ConversationStore, InMemoryStore},
    tools::NoTools,
    ProcessRequest, SessionController,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// A model that streams a fixed reply one word at a time
#[derive(Clone)]
struct ScriptedModel {
    reply: &'static str,
    seen: Arc<Mutex<Vec<Vec<AdaptedTurn>>>>,
}

impl ScriptedModel {
    fn new(reply: &'static str) -> Self {
        Self {
            reply,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ModelHandle for ScriptedModel {
    async fn stream(&self, turns: &[AdaptedTurn]) -> Result<ChunkStream> {
        self.seen.lock().unwrap().push(turns.to_vec());
        let reply = self.reply;
        Ok(Box::pin(async_stream::stream! {
            for word in reply.split_inclusive(' ') {
                tokio::task::yield_now().await;
                yield Ok::<_, anyhow::Error>(StreamChunk::text(word));
            }
        }))
    }

    async fn invoke(&self, turns: &[AdaptedTurn]) -> Result<ModelResponse> {
        self.seen.lock().unwrap().push(turns.to_vec());
        Ok(ModelResponse {
            content: json!(self.reply),
            ..Default::default()
        })
    }

    fn bind_tools(&self, _tools: &[Tool]) -> Result<Arc<dyn ModelHandle>> {
        Ok(Arc::new(self.clone()))
    }
}

#[tokio::test]
async fn test_hello_end_to_end() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store
        .add_message("thread-1", ConversationTurn::system().with_text("You are helpful"))
        .await?;

    let profile = resolve_profile("https://api.openai.com/v1", "gpt-4o", None);
    let model = ScriptedModel::new("Hello!");
    let (publisher, events) = ChannelPublisher::new(100);
    let controller = SessionController::new(
        store.clone(),
        Arc::new(model.clone()),
        Arc::new(NoTools),
        Arc::new(publisher),
        profile,
    )
    .with_rate_window(Duration::from_millis(1000));

    let turn = controller
        .process_message(ProcessRequest::new("thread-1", "Hi"), CancellationToken::new())
        .await?;

    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.content.to_text(), "Hello!");
    assert_eq!(turn.status, TurnStatus::Completed);

    let history = store.get_thread_messages("thread-1").await?;
    assert_eq!(history.len(), 3);
    assert_eq!(
        adapt(&history[..2], &profile, ""),
        vec![
            AdaptedTurn::system("You are helpful"),
            AdaptedTurn::user("Hi")
        ]
    );
    assert_eq!(model.seen.lock().unwrap()[0], adapt(&history[..2], &profile, ""));

    drop(controller);
    let events: Vec<ProgressEvent> = events.map(|(_, event)| event).collect().await;
    assert!(events.contains(&ProgressEvent::MessageUpdate {
        message_id: turn.id.clone(),
        content: "Hello!".to_string(),
    }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Status {
            message_id: turn.id.clone(),
            status: TurnStatus::Completed,
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_strict_provider_sees_alternating_turns() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    for turn in [
        ConversationTurn::assistant().with_text("Welcome!"),
        ConversationTurn::assistant().with_text("How can I help?"),
    ] {
        store.add_message("thread-2", turn).await?;
    }

    let profile = resolve_profile("https://api.anthropic.com", "claude-3-5-sonnet", None);
    let model = ScriptedModel::new("Sure.");
    let (publisher, _events) = ChannelPublisher::new(100);
    let controller = SessionController::new(
        store.clone(),
        Arc::new(model.clone()),
        Arc::new(NoTools),
        Arc::new(publisher),
        profile,
    )
    .with_system_prompt("Be kind");

    let turn = controller
        .process_message(ProcessRequest::new("thread-2", "I need help"), CancellationToken::new())
        .await?;
    assert_eq!(turn.content.to_text(), "Sure.");

    let seen = model.seen.lock().unwrap()[0].clone();
    assert_eq!(
        seen,
        vec![
            AdaptedTurn::system("Be kind"),
            AdaptedTurn::user(
                "[Previous assistant response: Welcome!\n\nHow can I help?]\n\nI need help"
            ),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_controller_from_settings_file() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        "[provider]\nbase_url = \"https://api.anthropic.com\"\nmodel = \"claude-3-5-sonnet\"\n\n[agent]\nsystem_prompt = \"Be brief\"\n\n[stream]\nprogress_capacity = 16"
    )?;
    let settings = Settings::load(Some(file.path()))?;

    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::new("Hi there.");
    let (publisher, events) = settings.stream.publisher();
    let controller = SessionController::from_settings(
        &settings,
        store.clone(),
        Arc::new(model.clone()),
        Arc::new(NoTools),
        Arc::new(publisher),
    );
    assert!(controller.profile().requires_strict_alternation);

    let turn = controller
        .process_message(ProcessRequest::new("thread-3", "Hello"), CancellationToken::new())
        .await?;
    assert_eq!(turn.status, TurnStatus::Completed);
    assert_eq!(
        model.seen.lock().unwrap()[0],
        vec![AdaptedTurn::system("Be brief"), AdaptedTurn::user("Hello")]
    );

    drop(controller);
    let events: Vec<ProgressEvent> = events.map(|(_, event)| event).collect().await;
    assert!(events.contains(&ProgressEvent::Status {
        message_id: turn.id.clone(),
        status: TurnStatus::Completed,
    }));
    Ok(())
}
