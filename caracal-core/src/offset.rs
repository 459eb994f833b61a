use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical position of a record within a topic
///
/// Offsets are dense and strictly increasing per topic: the first record
/// is offset 0 and every append takes the next integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(pub u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    #[inline]
    pub fn new(offset: u64) -> Self {
        Offset(offset)
    }

    #[inline]
    pub fn next(&self) -> Self {
        Offset(self.0.saturating_add(1))
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Offset(offset)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}
