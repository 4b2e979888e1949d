//! In-memory transport for exercising the execution layer in tests.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ApiResult, SearchTransport};

/// A recorded request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCall {
    pub path: String,
    pub body: Value,
}

/// Scripted transport: answers from a FIFO of prepared results, falling back
/// to a fixed value, optionally after a (tokio-clock) delay so cancellation
/// and dedup windows can be exercised under paused time.
pub(crate) struct FakeTransport {
    delay: Duration,
    fallback: Value,
    script: Mutex<VecDeque<ApiResult<Value>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fallback: json!({"occurrences": [], "count": 0}),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one response consumed before the fallback applies.
    pub fn push_response(&self, response: ApiResult<Value>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(&self, path: &str, body: Value, cancel: &CancellationToken) -> ApiResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            path: path.to_owned(),
            body,
        });

        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(ApiError::Cancelled),
                () = tokio::time::sleep(self.delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[async_trait]
impl SearchTransport for FakeTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> ApiResult<Value> {
        self.answer(path, body.clone(), cancel).await
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ApiResult<Value> {
        let query: Value = query
            .iter()
            .map(|(k, v)| ((*k).to_owned(), json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        self.answer(path, query, cancel).await
    }
}
