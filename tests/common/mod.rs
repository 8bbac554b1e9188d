//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use mediascope::error::{MediascopeError, Result};
use mediascope::protocol::{Batch, HostReply};
use mediascope::relay::HostEndpoint;

/// Host endpoint that records every batch and answers from a script of
/// replies. Once the script runs out it keeps repeating the last reply.
pub struct RecordingHost {
    name: String,
    batches: Mutex<Vec<Batch>>,
    replies: Mutex<VecDeque<Option<String>>>,
    last_reply: Mutex<Option<String>>,
    failing: bool,
    latency: Option<Duration>,
}

impl RecordingHost {
    pub fn silent(name: &str) -> Self {
        Self::replying(name, &[])
    }

    pub fn replying(name: &str, host_ids: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            batches: Mutex::new(Vec::new()),
            replies: Mutex::new(host_ids.iter().map(|id| Some(id.to_string())).collect()),
            last_reply: Mutex::new(None),
            failing: false,
            latency: None,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            failing: true,
            ..Self::silent(name)
        }
    }

    /// A silent host that takes `latency` to answer each batch.
    pub fn slow(name: &str, latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::silent(name)
        }
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    /// Every message of every batch, in delivery order.
    pub fn messages(&self) -> Vec<Value> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.changes.clone())
            .collect()
    }
}

#[async_trait]
impl HostEndpoint for RecordingHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, batch: &Batch) -> Result<Option<HostReply>> {
        self.batches.lock().push(batch.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing {
            return Err(MediascopeError::HostError(format!("{} is down", self.name)));
        }
        let reply = match self.replies.lock().pop_front() {
            Some(reply) => {
                *self.last_reply.lock() = reply.clone();
                reply
            }
            None => self.last_reply.lock().clone(),
        };
        Ok(reply.map(|host_id| HostReply {
            host_id: Some(host_id),
        }))
    }
}

/// Messages of the given `type`.
pub fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
    messages
        .iter()
        .filter(|message| message["type"] == kind)
        .collect()
}
