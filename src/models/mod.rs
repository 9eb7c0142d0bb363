pub mod action;
pub mod error;
pub mod message;

pub use action::{ActionKind, DecodedPayload, ModelAction};
pub use error::{AgentError, FileErrorKind, Result};
pub use message::{Message, Role, SessionMetadata, SessionRecord};
