//! Message routing between extension contexts.
//!
//! UI contexts build an [`Envelope`] and hand it to the background context,
//! where the [`Router`] resolves the route and the message kind to exactly one
//! handler. Kinds are registered globally; handlers are bound per route, so
//! independent subsystems can share one transport without kind collisions.

pub mod error;
pub mod handler;
pub mod message;
pub mod port;
pub mod registry;
pub mod router;

pub use error::{HandlerError, RouterError};
pub use handler::HandlerMap;
pub use message::{Envelope, ErrorBody, Message, Reply};
pub use port::{spawn_port, PortClient};
pub use registry::MessageRegistry;
pub use router::Router;
