use thiserror::Error;

/// Typed failures surfaced by the engine. Carried inside `eyre::Report` and
/// recovered by callers with `downcast_ref::<EngineError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
    #[error("history provider error: {0}")]
    Provider(String),
}

impl EngineError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientData(_) => "insufficient_data",
            Self::ParameterOutOfRange(_) => "parameter_out_of_range",
            Self::InternalInconsistency(_) => "internal_inconsistency",
            Self::Provider(_) => "provider",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing glucose history")]
    MissingGlucose,
    #[error("missing engine settings")]
    MissingSettings,
    #[error("missing evaluation time")]
    MissingNow,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

pub(crate) fn invalid(msg: impl Into<String>) -> Report {
    Report::new(EngineError::InvalidInput(msg.into()))
}

pub(crate) fn insufficient(msg: impl Into<String>) -> Report {
    Report::new(EngineError::InsufficientData(msg.into()))
}

pub(crate) fn out_of_range(msg: impl Into<String>) -> Report {
    Report::new(EngineError::ParameterOutOfRange(msg.into()))
}

pub(crate) fn inconsistent(msg: impl Into<String>) -> Report {
    Report::new(EngineError::InternalInconsistency(msg.into()))
}

/// True when `e` carries `EngineError::InsufficientData`.
pub fn is_insufficient_data(e: &Report) -> bool {
    matches!(
        e.downcast_ref::<EngineError>(),
        Some(EngineError::InsufficientData(_))
    )
}
