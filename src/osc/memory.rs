//! In-memory OSC sink
//!
//! Records every message instead of sending it. Used by tests and by dry runs where no
//! receiver is listening.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rosc::OscType;
use tokio::time::Instant;

use super::sink::OscSink;
use crate::error::ShockResult;

/// A message captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub address: String,
    pub args: Vec<OscType>,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every message sent to `address`, oldest first
    pub fn sent_to(&self, address: &str) -> Vec<SentMessage> {
        self.messages()
            .into_iter()
            .filter(|msg| msg.address == address)
            .collect()
    }

    /// First argument of the latest message sent to `address`
    pub fn last_value(&self, address: &str) -> Option<OscType> {
        self.sent_to(address)
            .pop()
            .and_then(|msg| msg.args.into_iter().next())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl OscSink for MemorySink {
    async fn send(&self, address: &str, args: Vec<OscType>) -> ShockResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                address: address.to_string(),
                args,
                at: Instant::now(),
            });
        Ok(())
    }
}
