use crate::{
    error::{Error, Result},
    id::RequestId,
};

/// How a lookup ended.
///
/// A lookup either produced data or failed, never both: an error can only be
/// attached while no result has been recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<R> {
    /// The venue signalled end-of-stream. May hold zero results.
    Resolved(Vec<R>),
    /// The venue reported a terminal error before any result.
    Failed(String),
}

/// A closed, immutable lookup result.
///
/// Entries live as long as the registry that owns them.
#[derive(Debug)]
pub struct CacheEntry<D, R> {
    descriptor: D,
    correlation_id: RequestId,
    outcome: Outcome<R>,
}

impl<D, R> CacheEntry<D, R>
where
    D: core::fmt::Debug,
    R: Clone,
{
    pub(crate) fn new(descriptor: D, correlation_id: RequestId, outcome: Outcome<R>) -> Self {
        Self {
            descriptor,
            correlation_id,
            outcome,
        }
    }

    /// The descriptor whose request produced this entry.
    pub fn descriptor(&self) -> &D {
        &self.descriptor
    }

    /// The correlation id the entry was requested under.
    pub fn correlation_id(&self) -> RequestId {
        self.correlation_id
    }

    pub fn outcome(&self) -> &Outcome<R> {
        &self.outcome
    }

    /// Results in delivery order. Empty for failed lookups.
    pub fn results(&self) -> &[R] {
        match &self.outcome {
            Outcome::Resolved(results) => results,
            Outcome::Failed(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Resolved(_) => None,
            Outcome::Failed(message) => Some(message),
        }
    }

    /// Converts the entry into what a blocking caller receives.
    ///
    /// # Errors
    /// Returns [`Error::Remote`] carrying the venue's message for failed
    /// lookups.
    pub fn to_result(&self) -> Result<Vec<R>> {
        match &self.outcome {
            Outcome::Resolved(results) => Ok(results.clone()),
            Outcome::Failed(message) => Err(Error::Remote {
                descriptor: format!("{:?}", self.descriptor),
                message: message.clone(),
            }),
        }
    }
}
