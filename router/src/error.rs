use std::borrow::Cow;
use std::fmt;

/// Routing and registration failures.
///
/// Registration variants are configuration errors and should surface at
/// startup; dispatch variants reach the caller as a rejected request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("message kind '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("message kind '{0}' is not registered")]
    UnregisteredMessageKind(String),

    #[error("route '{0}' is not registered")]
    UnknownRoute(String),

    #[error("route '{route}' has no handler for '{kind}'")]
    NoHandlerForKind { route: String, kind: String },

    #[error("route '{0}' is already registered")]
    DuplicateRoute(String),

    #[error("route '{0}' must be added with at least one handler")]
    EmptyHandlerMap(String),

    #[error("message kind '{kind}' is already handled by route '{route}'")]
    HandlerAlreadyBound { kind: String, route: String },

    #[error("message kind '{0}' has no handler")]
    MissingHandler(String),

    #[error("invalid payload for '{kind}': {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("invalid response for '{kind}': {reason}")]
    InvalidResponse { kind: String, reason: String },

    #[error("handler for '{kind}' failed: {error}")]
    Handler { kind: String, error: HandlerError },

    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("background context is not reachable")]
    Disconnected,
}

impl RouterError {
    /// Stable wire code for the error, used in [`crate::Reply`] bodies.
    pub fn code(&self) -> String {
        match self {
            RouterError::DuplicateRegistration(_) => "duplicate-registration".to_string(),
            RouterError::UnregisteredMessageKind(_) => "unregistered-message-kind".to_string(),
            RouterError::UnknownRoute(_) => "unknown-route".to_string(),
            RouterError::NoHandlerForKind { .. } => "no-handler-for-kind".to_string(),
            RouterError::DuplicateRoute(_) => "duplicate-route".to_string(),
            RouterError::EmptyHandlerMap(_) => "empty-handler-map".to_string(),
            RouterError::HandlerAlreadyBound { .. } => "handler-already-bound".to_string(),
            RouterError::MissingHandler(_) => "missing-handler".to_string(),
            RouterError::InvalidPayload { .. } => "invalid-payload".to_string(),
            RouterError::InvalidResponse { .. } => "invalid-response".to_string(),
            RouterError::Handler { error, .. } => error.code().to_string(),
            RouterError::Remote { code, .. } => code.clone(),
            RouterError::Disconnected => "disconnected".to_string(),
        }
    }

    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            RouterError::Handler { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failure returned by a handler, tagged with a wire code.
///
/// The underlying error stays available for in-process callers through
/// [`HandlerError::downcast_ref`].
pub struct HandlerError {
    code: Cow<'static, str>,
    source: anyhow::Error,
}

impl HandlerError {
    pub fn new(code: impl Into<Cow<'static, str>>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn source(&self) -> &anyhow::Error {
        &self.source
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.source.downcast_ref::<E>()
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new("handler-error", error)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("code", &self.code)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.source)
    }
}
