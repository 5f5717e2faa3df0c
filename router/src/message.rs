use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RouterError;

/// A typed request that can cross a context boundary.
///
/// `KIND` must be unique across the whole router; `ROUTE` names the
/// subsystem whose handler map owns it.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    const KIND: &'static str;
    const ROUTE: &'static str;

    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Cheap structural checks run before the handler is invoked.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The `{route, kind, payload}` unit transmitted between contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub route: String,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(route: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            route: route.into(),
            kind: kind.into(),
            payload,
        }
    }

    pub fn from_message<M: Message>(msg: &M) -> Result<Self, RouterError> {
        let payload = serde_json::to_value(msg).map_err(|e| RouterError::InvalidPayload {
            kind: M::KIND.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(M::ROUTE, M::KIND, payload))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// What goes back to the calling context for every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Decode a reply into the response type of `M`.
    pub fn into_response<M: Message>(self) -> Result<M::Response, RouterError> {
        if !self.ok {
            let body = self.error.unwrap_or_else(|| ErrorBody {
                code: "unknown".to_string(),
                message: "reply carried no error body".to_string(),
            });
            return Err(RouterError::Remote {
                code: body.code,
                message: body.message,
            });
        }

        let value = self.result.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| RouterError::InvalidResponse {
            kind: M::KIND.to_string(),
            reason: e.to_string(),
        })
    }
}

impl From<Result<Value, RouterError>> for Reply {
    fn from(result: Result<Value, RouterError>) -> Self {
        match result {
            Ok(value) => Reply::success(value),
            Err(e) => Reply::failure(e.code(), e.to_string()),
        }
    }
}
