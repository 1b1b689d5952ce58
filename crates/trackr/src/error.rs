//! 💀 Errors: the three ways a record's journey can end badly.
//!
//! 🧠 Knowledge graph:
//! - `IllegalData`: the validator said no. Always synchronous, always before any sink sees the record.
//! - `Delivery`: the transport said no. Non-2xx status or the socket never connected.
//! - `Lifecycle`: the async engine said no. Double start, send while stopped, worker panic.
//! - `InvalidConfig`: you said something the config layer could not make sense of.
//!
//! The CLI and config loader wrap these in `anyhow` at the edges. Inside the library
//! everything stays typed, so callers can `match` instead of grepping strings. 🦆

use thiserror::Error;

/// 📦 The library-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// 💀 Everything that can go wrong between `track()` and a 2xx.
#[derive(Debug, Error)]
pub enum Error {
    /// 🚫 A record failed normalization. Carries the human-readable cause.
    #[error("illegal data: {0}")]
    IllegalData(String),

    /// 📡 A transmission attempt failed.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// 🔄 The asynchronous engine was asked to do something its state forbids.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 🔧 Configuration could not be turned into a working client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand used all over the validator.
    pub(crate) fn illegal(cause: impl Into<String>) -> Self {
        Error::IllegalData(cause.into())
    }

    pub fn is_illegal_data(&self) -> bool {
        matches!(self, Error::IllegalData(_))
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

/// 📡 Why a single transmission attempt did not land.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The endpoint answered, just not with a 2xx.
    #[error("endpoint answered with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never got an answer at all.
    #[error("connection failure: {0}")]
    Connection(String),
}

/// 🔄 State-machine violations of the asynchronous batching engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("async batching engine is already running")]
    AlreadyRunning,

    #[error("async batching engine is not running")]
    NotRunning,

    #[error("batch worker panicked: {0}")]
    WorkerPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_errors_know_what_they_are() {
        let illegal = Error::illegal("property [distinct_id] must not be empty");
        assert!(illegal.is_illegal_data());
        assert!(!illegal.is_delivery());
        assert_eq!(
            illegal.to_string(),
            "illegal data: property [distinct_id] must not be empty"
        );

        let delivery: Error = DeliveryError::Status {
            status: 503,
            body: "busy".into(),
        }
        .into();
        assert!(delivery.is_delivery());
        assert!(delivery.to_string().contains("503"));

        let lifecycle: Error = LifecycleError::AlreadyRunning.into();
        assert!(matches!(
            lifecycle,
            Error::Lifecycle(LifecycleError::AlreadyRunning)
        ));
    }
}
