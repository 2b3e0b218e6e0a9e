use thiserror::Error;

/// Wire-level frame parsing failures. All of these are dropped by the session
/// pump (debug-logged, counted), never fatal; the stream tolerates noise.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {len} bytes is shorter than the {header} byte header")]
    MalformedFrame { len: usize, header: usize },

    #[error("Unknown frame type byte {type_byte:#04x}")]
    UnknownFrameType { type_byte: u8 },

    #[error("Payload truncated: header promises {expected} bytes, got {actual}")]
    PayloadTruncated { expected: usize, actual: usize },
}

/// Accumulation-buffer update failures. A rejected frame leaves the buffer
/// untouched; the caller drops the frame and the stream continues.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Append rows [{start_row}, {end_row}) exceed reported total height {total_height}")]
    RowsOutOfRange { start_row: u32, end_row: u32, total_height: u32 },

    #[error("Mid-stream width change {current} → {incoming} (only a baseline replace may change width)")]
    WidthChanged { current: u32, incoming: u32 },

    #[error("Frame has zero width or height and is not a tail clear")]
    ZeroSizeFrame,
}

/// Decode worker pool failures. An error rejects only the task that raised it;
/// the pool itself stays up.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Raw pixel fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("Raw payload is {actual} bytes, expected {expected} for the reported dimensions")]
    PayloadSize { expected: usize, actual: usize },

    #[error("Decode pool is closed")]
    PoolClosed,
}

/// Session controller failures. These surface to the user but never corrupt
/// buffer or chunk state, which stays independently resettable.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Capture service {op} failed: {reason}")]
    Service { op: &'static str, reason: String },

    #[error("Frame stream closed by the capture service")]
    StreamClosed,

    #[error("No composite captured yet")]
    NoComposite,

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}
