use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum PlatformError {
    #[error("pod not found: {namespace}/{name}")]
    #[diagnostic(code(mbcas::platform::pod_not_found), help("the pod may have been deleted"))]
    PodNotFound { namespace: String, name: String },

    #[error("node not found: {name}")]
    #[diagnostic(code(mbcas::platform::node_not_found))]
    NodeNotFound { name: String },

    #[error("in-place resize rejected for {namespace}/{name}: {message}")]
    #[diagnostic(
        code(mbcas::platform::resize_unsupported),
        help("mark the PodAllocation Failed; do not retry until the pod spec changes")
    )]
    ResizeUnsupported {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("platform API request failed: {message}")]
    #[diagnostic(code(mbcas::platform::request_failed), help("retry with back-off; this may be transient"))]
    RequestFailed { message: String },
}

pub type Result<T> = std::result::Result<T, PlatformError>;

impl PlatformError {
    pub fn pod_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::PodNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn node_not_found(name: impl Into<String>) -> Self {
        Self::NodeNotFound { name: name.into() }
    }

    pub fn resize_unsupported(
        namespace: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ResizeUnsupported {
            namespace: namespace.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }
}
