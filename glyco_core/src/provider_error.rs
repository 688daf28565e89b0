//! Maps `BoxError` from the collaborator traits to typed `EngineError`.
//!
//! The traits in `glyco_traits` use `Box<dyn Error + Send + Sync>` so hosts
//! can return whatever their storage produces; this module converts those to
//! the engine's error enum.

use crate::error::EngineError;

/// Map a trait-boundary error to a typed `EngineError`.
///
/// Engine errors pass through unchanged. Missing data becomes
/// `InsufficientData`; anything else is a provider failure.
pub fn map_provider_error(e: &(dyn std::error::Error + 'static)) -> EngineError {
    if let Some(engine) = e.downcast_ref::<EngineError>() {
        return engine.clone();
    }
    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::NotFound
    {
        return EngineError::InsufficientData(io.to_string());
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("not found") || lower.contains("no data") {
        EngineError::InsufficientData(s)
    } else {
        EngineError::Provider(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_pass_through() {
        let e = EngineError::InvalidInput("bad".into());
        assert_eq!(map_provider_error(&e), e);
    }

    #[test]
    fn missing_files_are_insufficient_data() {
        let e = std::io::Error::new(std::io::ErrorKind::NotFound, "glucose.csv");
        assert!(matches!(map_provider_error(&e), EngineError::InsufficientData(_)));
    }

    #[test]
    fn other_failures_are_provider_errors() {
        let e = std::io::Error::other("connection reset");
        assert_eq!(
            map_provider_error(&e),
            EngineError::Provider("connection reset".into())
        );
    }
}
