use core::fmt;

use crate::error::{Error, Result};

/// Correlation id the remote side uses for callbacks that are not tied to any
/// request (connection notices, farm status messages, ...).
pub const NO_REQUEST_ID: i64 = i32::MAX as i64;

/// A protocol-level correlation id tying an outbound call to its inbound
/// responses.
///
/// Ids handed out by this crate are always positive. Raw ids coming back from
/// the reader thread are validated with [`RequestId::from_raw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RequestId(i64);

impl RequestId {
    pub(crate) const fn new_unchecked(raw: i64) -> Self {
        Self(raw)
    }

    /// Validates a raw id received from the remote side.
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for negative ids.
    pub fn from_raw(raw: i64) -> Result<Self> {
        if raw < 0 {
            return Err(Error::violation(format!(
                "negative correlation id {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// The raw integer value.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns `true` for the session-level "no request" sentinel.
    pub const fn is_unrouted(self) -> bool {
        self.0 == NO_REQUEST_ID
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RequestId> for i64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl TryFrom<i64> for RequestId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
    }
}
