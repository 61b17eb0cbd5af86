//! Error types for modhelper-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before it reached the queue.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template has no instantiable payload: {0}")]
    MissingPayload(String),

    #[error("failed to instantiate template: {0}")]
    Instantiation(String),

    #[error("failed to place instance: {0}")]
    Placement(String),

    #[error("work item panicked: {0}")]
    Panicked(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error("execution context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("drain called off the main thread")]
    NotMainThread,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable name, used as a metric label and in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::TemplateNotFound(_) => "template_not_found",
            Error::MissingPayload(_) => "missing_payload",
            Error::Instantiation(_) => "instantiation",
            Error::Placement(_) => "placement",
            Error::Panicked(_) => "panicked",
            Error::Task(_) => "task",
            Error::ContextUnavailable(_) => "context_unavailable",
            Error::Teardown(_) => "teardown",
            Error::NotMainThread => "not_main_thread",
            Error::Config(_) => "config",
            Error::Catalog(_) => "catalog",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
