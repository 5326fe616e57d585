use thiserror::Error;

pub const DATA_UNAVAILABLE_MESSAGE: &str = "Could not fetch messages";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("message store unavailable: {0}")]
    DataUnavailable(String),
    #[error("generative-text service failure: {0}")]
    Upstream(String),
    #[error("malformed generative-text response: {0}")]
    MalformedUpstreamResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// The text returned to HTTP callers in `{"error": ...}`.
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

impl ApplicationError {
    /// Maps to an interface error. `failure_message` is the route-specific text
    /// used for generative-text failures; read failures always say
    /// [`DATA_UNAVAILABLE_MESSAGE`].
    pub fn into_interface(
        self,
        failure_message: &str,
        correlation_id: impl Into<String>,
    ) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::DataUnavailable(_) => InterfaceError::Internal {
                message: DATA_UNAVAILABLE_MESSAGE.to_owned(),
                correlation_id,
            },
            Self::Upstream(_) | Self::MalformedUpstreamResponse(_) => {
                InterfaceError::Internal { message: failure_message.to_owned(), correlation_id }
            }
            Self::InvalidRequest(message) => InterfaceError::BadRequest { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError, DATA_UNAVAILABLE_MESSAGE};

    #[test]
    fn store_failures_use_generic_message() {
        let interface = ApplicationError::DataUnavailable("pool closed".to_owned())
            .into_interface("Failed to analyze sentiment", "req-1");

        assert!(matches!(
            interface,
            InterfaceError::Internal { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.public_message(), DATA_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn upstream_failures_use_route_message() {
        let interface = ApplicationError::Upstream("status 503".to_owned())
            .into_interface("Failed to generate action items", "req-2");

        assert_eq!(interface.public_message(), "Failed to generate action items");
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn malformed_responses_do_not_leak_model_output() {
        let interface = ApplicationError::MalformedUpstreamResponse(
            "expected value at line 1 column 1: `Sure! Here is`".to_owned(),
        )
        .into_interface("Failed to analyze messages", "req-3");

        assert_eq!(interface.public_message(), "Failed to analyze messages");
    }

    #[test]
    fn invalid_requests_map_to_bad_request() {
        let interface = ApplicationError::InvalidRequest("invalid limit `abc`".to_owned())
            .into_interface("unused", "req-4");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.public_message(), "invalid limit `abc`");
    }
}
