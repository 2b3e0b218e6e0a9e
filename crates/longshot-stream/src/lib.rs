//! Stream ingest for the long-screenshot engine: wire-frame parsing and the
//! accumulation buffer that stitches partial row updates into one composite.

pub mod frame;
pub mod reconciler;

pub use frame::{FrameHeader, FrameType, HEADER_SIZE};
pub use reconciler::{Outcome, Reconciler, TailFrame};
