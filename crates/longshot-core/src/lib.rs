pub mod config;
pub mod errors;
pub mod geometry;
pub mod types;

pub use config::EngineConfig;
pub use errors::{DecodeError, ProtocolError, ReconcileError, SessionError};
pub use geometry::{Edge, Point, Rect};
pub use types::*;
