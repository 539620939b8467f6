use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use crate::models::tool::ToolCall;
use crate::models::turn::TurnStatus;

/// Progress of an assistant turn, published on the thread's topic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    MessageUpdate {
        message_id: String,
        content: String,
    },
    TokenRate {
        message_id: String,
        tokens_per_second: f64,
    },
    Status {
        message_id: String,
        status: TurnStatus,
    },
    ToolCalls {
        message_id: String,
        calls: Vec<ToolCall>,
    },
    Error {
        message_id: String,
        message: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("progress queue is full")]
    Full,

    #[error("progress queue is closed")]
    Closed,
}

/// Fire-and-forget delivery of progress events to subscribers
pub trait ProgressPublisher: Send + Sync {
    fn publish(&self, topic: &str, event: ProgressEvent) -> Result<(), PublishError>;
}

/// Publish, logging a failure instead of returning it. Generation never waits on or stops
/// for a subscriber.
pub fn publish_or_log(publisher: &dyn ProgressPublisher, topic: &str, event: ProgressEvent) {
    if let Err(e) = publisher.publish(topic, event) {
        tracing::warn!(topic, error = %e, "dropping progress event");
    }
}

/// Publisher backed by a bounded queue
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<(String, ProgressEvent)>,
}

impl ChannelPublisher {
    /// A publisher and the stream of `(topic, event)` pairs it feeds
    pub fn new(capacity: usize) -> (Self, ReceiverStream<(String, ProgressEvent)>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, ReceiverStream::new(receiver))
    }
}

impl ProgressPublisher for ChannelPublisher {
    fn publish(&self, topic: &str, event: ProgressEvent) -> Result<(), PublishError> {
        self.sender
            .try_send((topic.to_string(), event))
            .map_err(|e| match e {
                TrySendError::Full(_) => PublishError::Full,
                TrySendError::Closed(_) => PublishError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn update(content: &str) -> ProgressEvent {
        ProgressEvent::MessageUpdate {
            message_id: "m1".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::Status {
            message_id: "m1".to_string(),
            status: TurnStatus::Cancelled,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "status", "message_id": "m1", "status": "cancelled"})
        );

        let event = ProgressEvent::TokenRate {
            message_id: "m1".to_string(),
            tokens_per_second: 12.5,
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "token_rate");
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (publisher, mut events) = ChannelPublisher::new(1);

        assert_eq!(publisher.publish("t1", update("a")), Ok(()));
        assert_eq!(publisher.publish("t1", update("b")), Err(PublishError::Full));
        publish_or_log(&publisher, "t1", update("c"));

        assert_eq!(events.next().await, Some(("t1".to_string(), update("a"))));
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (publisher, events) = ChannelPublisher::new(4);
        drop(events);
        assert_eq!(publisher.publish("t1", update("a")), Err(PublishError::Closed));
    }
}
