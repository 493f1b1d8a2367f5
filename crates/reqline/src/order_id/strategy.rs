use core::{fmt, str::FromStr};

use crate::error::Error;

/// How order ids are allocated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OrderIdStrategy {
    /// Every ticket asks the venue for an id and waits for it. While tickets
    /// are outstanding the request is re-issued periodically, since the venue
    /// may silently drop it.
    #[default]
    Remote,
    /// Tickets are fulfilled immediately with `last known + 1`. The venue is
    /// only asked once, if no value has ever been delivered.
    Local,
}

impl OrderIdStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for OrderIdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderIdStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(Error::config(format!(
                "unknown order id strategy `{other}` (expected `remote` or `local`)"
            ))),
        }
    }
}
