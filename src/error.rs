use thiserror::Error;

/// Errors surfaced by the reactive bridge.
///
/// Every error delivered to a downstream subscriber terminates its
/// subscription; the bridge never retries.
#[derive(Debug, Error)]
pub enum SqlBridgeError {
    /// Reactive-streams rule 3.9: non-positive request amounts are illegal.
    #[error("Rule 3.9 non-positive request amounts are illegal: {0}")]
    InvalidRequest(i64),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Driver error: {0}")]
    Driver(String),

    /// A row mapper failed while reading one column; the row is suppressed.
    #[error("Mapping error at column {column}: {message}")]
    Mapping { column: usize, message: String },

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Batch error: {0}")]
    Batch(String),

    #[error("Data access error: {0}")]
    DataAccess(String),
}

impl SqlBridgeError {
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn batch(message: impl Into<String>) -> Self {
        Self::Batch(message.into())
    }

    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    /// Whether this error reports a reactive-streams protocol violation.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_message() {
        let err = SqlBridgeError::driver("statement rejected");
        assert!(err.to_string().contains("statement rejected"));

        let err = SqlBridgeError::Mapping {
            column: 3,
            message: "not a timestamp".into(),
        };
        assert!(err.to_string().contains("column 3"));
    }

    #[test]
    fn invalid_request_is_a_protocol_violation() {
        assert!(SqlBridgeError::InvalidRequest(0).is_protocol_violation());
        assert!(!SqlBridgeError::render("boom").is_protocol_violation());
    }
}
