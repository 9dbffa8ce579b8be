use std::collections::HashMap;

use async_trait::async_trait;
use derive_more::Display;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, PartialEq, Display)]
pub enum QueueError {
    #[display("stream '{_0}' is not declared")]
    UnknownStream(String),
    #[display("stream '{_0}' already has a consumer")]
    AlreadySubscribed(String),
    #[display("stream '{_0}' is closed")]
    Closed(String),
}

impl std::error::Error for QueueError {}

/// Pull side of a command stream.
#[async_trait]
pub trait CommandSource: Send {
    /// Next message body, `None` once the stream is closed. A body counts as
    /// acknowledged the moment it is returned.
    async fn next(&mut self) -> Option<Vec<u8>>;
}

struct Stream {
    sender: mpsc::Sender<Vec<u8>>,
    receiver: Option<mpsc::Receiver<Vec<u8>>>,
}

/// In-process broker of named, bounded streams with auto-acknowledged delivery.
/// Streams close once the broker and every publisher are dropped.
pub struct Broker {
    capacity: usize,
    streams: HashMap<String, Stream>,
}

impl Broker {
    pub fn new(capacity: usize) -> Self {
        Broker {
            capacity: capacity.max(1),
            streams: HashMap::new(),
        }
    }

    /// Declaring an existing stream is a no-op.
    pub fn declare(&mut self, name: &str) {
        let capacity = self.capacity;
        self.streams.entry(name.to_owned()).or_insert_with(|| {
            let (sender, receiver) = mpsc::channel(capacity);
            Stream {
                sender,
                receiver: Some(receiver),
            }
        });
    }

    pub fn publisher(&self, name: &str) -> Result<Publisher, QueueError> {
        let stream = self
            .streams
            .get(name)
            .ok_or_else(|| QueueError::UnknownStream(name.to_owned()))?;

        Ok(Publisher {
            stream: name.to_owned(),
            sender: stream.sender.clone(),
        })
    }

    pub fn subscribe(&mut self, name: &str) -> Result<Subscription, QueueError> {
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| QueueError::UnknownStream(name.to_owned()))?;
        let receiver = stream
            .receiver
            .take()
            .ok_or_else(|| QueueError::AlreadySubscribed(name.to_owned()))?;

        Ok(Subscription {
            stream: name.to_owned(),
            receiver,
        })
    }
}

#[derive(Clone)]
pub struct Publisher {
    stream: String,
    sender: mpsc::Sender<Vec<u8>>,
}

impl Publisher {
    /// Waits while the stream is full.
    pub async fn publish(&self, body: Vec<u8>) -> Result<(), QueueError> {
        self.sender
            .send(body)
            .await
            .map_err(|_| QueueError::Closed(self.stream.clone()))
    }
}

pub struct Subscription {
    stream: String,
    receiver: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl CommandSource for Subscription {
    async fn next(&mut self) -> Option<Vec<u8>> {
        let body = self.receiver.recv().await;
        if body.is_none() {
            debug!("Stream {} closed", self.stream);
        }
        body
    }
}
