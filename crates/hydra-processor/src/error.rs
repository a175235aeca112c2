/// Errors produced by the chunk processor.
///
/// Cloneable so the same error can be fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// An encoded batch could not be decoded.
    #[error("failed to decode batch: {reason}")]
    Decode { reason: String },

    /// An encoded item exceeded the configured size limit.
    #[error("encoded item too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// A batch entry could not be applied to the ledger.
    #[error("invalid batch entry {key:?}: {reason}")]
    InvalidEntry { key: String, reason: String },

    /// Reading from the chunk source failed.
    #[error("chunk source read failed: {0}")]
    Io(String),

    /// The processor has been closed and accepts no more batches.
    #[error("processor is closed")]
    Closed,
}

/// Convenience alias used throughout the processor crate.
pub type Result<T> = std::result::Result<T, ProcessorError>;
