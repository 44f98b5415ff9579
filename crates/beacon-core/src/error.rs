use thiserror::Error;

/// Top-level error type for Beacon.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Missing required field or malformed input. Rejected at the boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more required request fields were absent or blank.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// The event itself is already in the past, so there is nothing to remind about.
    #[error("event time has already passed")]
    EventAlreadyPassed,

    /// Backing persistence unreachable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Delivery through a provider or notifier failed.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BeaconError {
    /// Whether this error should be surfaced to the caller as a client error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::MissingFields(_) | Self::EventAlreadyPassed
        )
    }
}

/// Outcome of a failed push delivery, as reported by the provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscription no longer exists at the provider (HTTP 404 / 410).
    #[error("subscription gone (status {0})")]
    Gone(u16),

    /// Any other failure. The subscription is kept.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl DeliveryError {
    /// Permanent failures remove the subscription from the registry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Gone(_))
    }
}
