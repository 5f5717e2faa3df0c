use std::collections::HashMap;

use serde_json::Value;

use crate::error::RouterError;
use crate::handler::HandlerMap;
use crate::message::{Envelope, Message};
use crate::registry::MessageRegistry;

/// Dispatch table for the background context.
///
/// Built once at startup, then shared behind an `Arc`. Registration needs
/// `&mut self`; dispatch only reads the tables.
#[derive(Default)]
pub struct Router {
    registry: MessageRegistry,
    routes: HashMap<String, HandlerMap>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_message<M: Message>(&mut self) -> Result<(), RouterError> {
        self.registry.register::<M>()
    }

    pub fn register_kind(&mut self, kind: &str) -> Result<(), RouterError> {
        self.registry.register_kind(kind)
    }

    /// Create `route` with its handler map.
    ///
    /// Every kind may be bound to exactly one route.
    pub fn add_handler(&mut self, route: &str, handlers: HandlerMap) -> Result<(), RouterError> {
        if self.routes.contains_key(route) {
            return Err(RouterError::DuplicateRoute(route.to_string()));
        }
        if handlers.is_empty() {
            return Err(RouterError::EmptyHandlerMap(route.to_string()));
        }
        for kind in handlers.kinds() {
            if let Some(owner) = self.route_for(kind) {
                return Err(RouterError::HandlerAlreadyBound {
                    kind: kind.to_string(),
                    route: owner.to_string(),
                });
            }
        }

        tracing::info!("Route '{}' added with {} handlers", route, handlers.len());
        self.routes.insert(route.to_string(), handlers);
        Ok(())
    }

    /// Startup check: every registered kind has a handler and every bound
    /// kind is registered.
    pub fn validate(&self) -> Result<(), RouterError> {
        for kind in self.registry.kinds() {
            if self.route_for(kind).is_none() {
                return Err(RouterError::MissingHandler(kind.to_string()));
            }
        }
        for handlers in self.routes.values() {
            for kind in handlers.kinds() {
                if !self.registry.contains(kind) {
                    return Err(RouterError::UnregisteredMessageKind(kind.to_string()));
                }
            }
        }
        Ok(())
    }

    pub async fn dispatch(&self, envelope: Envelope) -> Result<Value, RouterError> {
        let Envelope {
            route,
            kind,
            payload,
        } = envelope;

        if !self.registry.contains(&kind) {
            tracing::warn!("Rejected unregistered message kind '{}'", kind);
            return Err(RouterError::UnregisteredMessageKind(kind));
        }
        let handlers = self
            .routes
            .get(&route)
            .ok_or_else(|| RouterError::UnknownRoute(route.clone()))?;
        let handler = handlers
            .get(&kind)
            .ok_or_else(|| RouterError::NoHandlerForKind {
                route: route.clone(),
                kind: kind.clone(),
            })?;

        tracing::debug!("Dispatching {}/{}", route, kind);
        let result = handler(payload).await;
        match &result {
            // Handlers log their own failures.
            Err(e @ RouterError::Handler { .. }) => {
                tracing::debug!("{}/{} failed: {}", route, kind, e)
            }
            Err(e) => tracing::warn!("{}/{} rejected: {}", route, kind, e),
            Ok(_) => {}
        }
        result
    }

    /// Typed dispatch for callers living in the background context.
    pub async fn send<M: Message>(&self, msg: M) -> Result<M::Response, RouterError> {
        let envelope = Envelope::from_message(&msg)?;
        let value = self.dispatch(envelope).await?;
        serde_json::from_value(value).map_err(|e| RouterError::InvalidResponse {
            kind: M::KIND.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    fn route_for(&self, kind: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(_, handlers)| handlers.contains(kind))
            .map(|(route, _)| route.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    impl Message for Echo {
        const KIND: &'static str = "echo";
        const ROUTE: &'static str = "test";
        type Response = String;

        fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(!self.text.is_empty(), "text must not be empty");
            Ok(())
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Fail;

    impl Message for Fail {
        const KIND: &'static str = "fail";
        const ROUTE: &'static str = "test";
        type Response = ();
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn test_handlers() -> HandlerMap {
        HandlerMap::new()
            .on(|msg: Echo| async move { Ok::<_, HandlerError>(msg.text.to_uppercase()) })
            .on(|_: Fail| async move { Err(HandlerError::new("boom", Boom)) })
    }

    fn test_router() -> Router {
        let mut router = Router::new();
        router.register_message::<Echo>().unwrap();
        router.register_message::<Fail>().unwrap();
        router.add_handler("test", test_handlers()).unwrap();
        router
    }

    #[tokio::test]
    async fn test_send_typed_message() {
        let router = test_router();
        let reply = router
            .send(Echo {
                text: "hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply, "HELLO");
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_rejected_even_with_handler() {
        let mut router = Router::new();
        router.register_message::<Fail>().unwrap();
        router.add_handler("test", test_handlers()).unwrap();

        let err = router
            .dispatch(Envelope::new("test", "echo", json!({ "text": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnregisteredMessageKind(k) if k == "echo"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let router = test_router();
        let err = router
            .dispatch(Envelope::new("keyring", "echo", json!({ "text": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownRoute(r) if r == "keyring"));
    }

    #[tokio::test]
    async fn test_route_without_handler_for_kind() {
        let mut router = Router::new();
        router.register_message::<Echo>().unwrap();
        router.register_kind("other").unwrap();
        router
            .add_handler("test", HandlerMap::new().on(|m: Echo| async move { Ok::<_, HandlerError>(m.text) }))
            .unwrap();

        let err = router
            .dispatch(Envelope::new("test", "other", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::NoHandlerForKind { ref route, ref kind } if route == "test" && kind == "other"
        ));
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_handler() {
        let router = test_router();

        let err = router
            .dispatch(Envelope::new("test", "echo", json!({ "wrong": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPayload { .. }));

        let err = router
            .dispatch(Envelope::new("test", "echo", json!({ "text": "" })))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_handler_failure_is_propagated() {
        let router = test_router();
        let err = router.send(Fail).await.unwrap_err();

        assert_eq!(err.code(), "boom");
        let handler_error = err.handler_error().unwrap();
        assert!(handler_error.downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn test_add_handler_rejects_duplicates_and_empty_maps() {
        let mut router = test_router();

        let err = router.add_handler("test", test_handlers()).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateRoute(_)));

        let err = router.add_handler("empty", HandlerMap::new()).unwrap_err();
        assert!(matches!(err, RouterError::EmptyHandlerMap(_)));

        let err = router
            .add_handler("other", HandlerMap::new().on(|m: Echo| async move { Ok::<_, HandlerError>(m.text) }))
            .unwrap_err();
        assert!(matches!(err, RouterError::HandlerAlreadyBound { ref route, .. } if route == "test"));
    }

    #[test]
    fn test_validate_reports_missing_handler() {
        let mut router = test_router();
        assert!(router.validate().is_ok());

        router.register_kind("orphan").unwrap();
        let err = router.validate().unwrap_err();
        assert!(matches!(err, RouterError::MissingHandler(k) if k == "orphan"));
    }

    #[test]
    fn test_validate_reports_unregistered_bound_kind() {
        let mut router = Router::new();
        router.register_message::<Echo>().unwrap();
        router.add_handler("test", test_handlers()).unwrap();

        let err = router.validate().unwrap_err();
        assert!(matches!(err, RouterError::UnregisteredMessageKind(k) if k == "fail"));
    }
}
