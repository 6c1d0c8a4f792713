use serde::{Deserialize, Serialize};

/// Delivery guarantees requested for a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Delivery {
    /// Ordered and retransmitted. File transfers require this mode.
    #[default]
    Reliable,
    Unreliable,
    ReliableUnordered,
}

impl Delivery {
    pub fn is_ordered(self) -> bool {
        !matches!(self, Self::ReliableUnordered)
    }

    /// `None` means unlimited retransmits.
    pub fn max_retransmits(self) -> Option<u16> {
        match self {
            Self::Unreliable => Some(0),
            Self::Reliable | Self::ReliableUnordered => None,
        }
    }
}
