/// Errors produced while building a grammar or resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid placeholder pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("placeholder pattern {pattern:?} must have exactly one capture group, found {found}")]
    CaptureGroups { pattern: String, found: usize },
}

/// Convenience alias used throughout the resolver crate.
pub type Result<T> = std::result::Result<T, ResolverError>;
