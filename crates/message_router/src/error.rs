//! Error types for the message router

use std::fmt;

/// Error returned from a dispatch pass in which at least one subscriber failed.
///
/// A pass never stops early because a subscriber failed; every failure is
/// collected and folded into one of these variants once the pass is over.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Exactly one subscriber failed. The subscriber's error is carried unchanged.
    #[error(transparent)]
    Subscriber(#[from] anyhow::Error),

    /// Two or more subscribers failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl DispatchError {
    /// Folds the failures of one pass into a result.
    pub(crate) fn from_failures(mut failures: Vec<anyhow::Error>) -> Result<(), Self> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(DispatchError::Subscriber(failures.remove(0))),
            _ => Err(DispatchError::Aggregate(AggregateError { errors: failures })),
        }
    }

    /// Number of subscriber failures represented by this error.
    pub fn failure_count(&self) -> usize {
        match self {
            DispatchError::Subscriber(_) => 1,
            DispatchError::Aggregate(aggregate) => aggregate.len(),
        }
    }

    /// All subscriber failures in invocation order.
    pub fn into_errors(self) -> Vec<anyhow::Error> {
        match self {
            DispatchError::Subscriber(error) => vec![error],
            DispatchError::Aggregate(aggregate) => aggregate.into_errors(),
        }
    }
}

/// Ordered collection of failures raised by several subscribers in one pass.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    /// The collected errors in invocation order.
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<anyhow::Error> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} subscribers failed during dispatch", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            write!(f, "\n  [{index}] {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Errors raised while loading router configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed into a configuration
    #[error("Configuration parse failed: {0}")]
    Parse(#[from] toml::de::Error),
    /// Configuration parsed but holds an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
