//! Scripted Graph client for unit tests

use crate::graph::{GraphClient, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

type Handler = dyn Fn(&str) -> Result<Value, TransportError> + Send + Sync;

/// Answers every request through a closure and records the URLs requested
pub(crate) struct ScriptedClient {
    handler: Box<Handler>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replays responses in order, then fails every further request
    pub(crate) fn sequence(responses: Vec<Result<Value, TransportError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(exhausted()))
        })
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub(crate) fn exhausted() -> TransportError {
    TransportError::Decode {
        status: 599,
        message: "script exhausted".to_string(),
    }
}

#[async_trait]
impl GraphClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        (self.handler)(url)
    }
}
