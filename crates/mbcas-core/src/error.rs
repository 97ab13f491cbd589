use miette::Diagnostic;
use thiserror::Error;

/// Core error type for MBCAS operations.
///
/// Variants map onto the error-kind/policy table of the design doc: callers
/// that need to branch on policy (retry, tombstone, degrade, ...) should
/// match on `kind()` rather than inspect the message.
#[derive(Error, Debug, Diagnostic)]
pub enum MbcasError {
    /// Cgroup or platform I/O hiccup expected to clear on its own.
    #[error("transient failure reading {resource}: {message}")]
    #[diagnostic(
        code(mbcas::transient),
        help("retry with jittered back-off; this is expected under load")
    )]
    Transient {
        resource: String,
        message: String,
    },

    /// The pod or its cgroup disappeared between observation and use.
    #[error("not found: {resource}")]
    #[diagnostic(
        code(mbcas::not_found),
        help("the pod was likely deleted; tombstone any derived state")
    )]
    NotFound { resource: String },

    /// The solver could not satisfy the sum of bid minimums under capacity.
    #[error("infeasible: requested minimums ({requested_mc} mc) exceed capacity ({capacity_mc} mc)")]
    #[diagnostic(
        code(mbcas::infeasible),
        help("caller should proportionally scale minimums and mark the allocation Degraded")
    )]
    Infeasible {
        requested_mc: i64,
        capacity_mc: i64,
    },

    /// Optimistic-concurrency mismatch on a PodAllocation record.
    #[error("conflict updating {key}: expected generation {expected}, found {found}")]
    #[diagnostic(
        code(mbcas::conflict),
        help("refresh the record and retry the patch once")
    )]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// The platform rejected the operation and retrying will not help.
    #[error("unsupported: {message}")]
    #[diagnostic(
        code(mbcas::unsupported),
        help("mark the record Failed; do not retry until the pod spec changes")
    )]
    Unsupported { message: String },

    /// Configuration or environment error severe enough to abort startup.
    #[error("fatal: {message}")]
    #[diagnostic(code(mbcas::fatal), help("{suggestion}"))]
    Fatal { message: String, suggestion: String },

    /// Serialization failure on a PodAllocation record or sample payload.
    #[error("serialization error: {message}")]
    #[diagnostic(
        code(mbcas::serialization_error),
        help("check that the record matches the PodAllocation schema")
    )]
    SerializationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Anything that doesn't fit the policy table above.
    #[error("internal error: {message}")]
    #[diagnostic(
        code(mbcas::internal_error),
        help("this is likely a bug; report it with the full error details")
    )]
    Internal { message: String },
}

/// Result type alias for MBCAS operations.
pub type Result<T> = std::result::Result<T, MbcasError>;

/// Coarse error kind, used by callers that branch on a recovery policy
/// instead of matching the full enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    NotFound,
    Infeasible,
    Conflict,
    Unsupported,
    Fatal,
    Other,
}

impl MbcasError {
    pub fn transient(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn infeasible(requested_mc: i64, capacity_mc: i64) -> Self {
        Self::Infeasible {
            requested_mc,
            capacity_mc,
        }
    }

    pub fn conflict(key: impl Into<String>, expected: u64, found: u64) -> Self {
        Self::Conflict {
            key: key.into(),
            expected,
            found,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Infeasible { .. } => ErrorKind::Infeasible,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Fatal { .. } => ErrorKind::Fatal,
            Self::SerializationError { .. } | Self::Internal { .. } => ErrorKind::Other,
        }
    }
}

impl From<serde_json::Error> for MbcasError {
    fn from(err: serde_json::Error) -> Self {
        MbcasError::serialization_error(format!("JSON error: {}", err), Some(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_policy_bucket() {
        assert_eq!(MbcasError::not_found("pod/x").kind(), ErrorKind::NotFound);
        assert_eq!(
            MbcasError::infeasible(1200, 1000).kind(),
            ErrorKind::Infeasible
        );
        assert_eq!(
            MbcasError::conflict("default-web", 3, 4).kind(),
            ErrorKind::Conflict
        );
    }
}
