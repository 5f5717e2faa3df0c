use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::{HandlerError, RouterError};
use crate::message::Message;

pub(crate) type BoxedHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RouterError>> + Send + Sync>;

/// Handlers for one route, keyed by message kind.
#[derive(Default, Clone)]
pub struct HandlerMap {
    handlers: HashMap<String, BoxedHandler>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `M::KIND`. The payload is decoded and validated
    /// before the handler runs; a later binding for the same kind replaces
    /// the earlier one.
    pub fn on<M, F, Fut>(mut self, handler: F) -> Self
    where
        M: Message,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |payload: Value| {
            let handler = handler.clone();
            async move {
                let msg: M =
                    serde_json::from_value(payload).map_err(|e| RouterError::InvalidPayload {
                        kind: M::KIND.to_string(),
                        reason: e.to_string(),
                    })?;
                msg.validate().map_err(|e| RouterError::InvalidPayload {
                    kind: M::KIND.to_string(),
                    reason: format!("{:#}", e),
                })?;

                let response =
                    (handler.as_ref())(msg)
                        .await
                        .map_err(|error| RouterError::Handler {
                            kind: M::KIND.to_string(),
                            error,
                        })?;

                serde_json::to_value(response).map_err(|e| RouterError::InvalidResponse {
                    kind: M::KIND.to_string(),
                    reason: e.to_string(),
                })
            }
            .boxed()
        });

        self.handlers.insert(M::KIND.to_string(), boxed);
        self
    }

    pub(crate) fn get(&self, kind: &str) -> Option<&BoxedHandler> {
        self.handlers.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
