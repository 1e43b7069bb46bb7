use core::fmt;

/// Status code carried by cache script replies and by every [`Segment`].
///
/// The numeric values are the first field of the delimited reply
/// (`code|...`) produced by the INCR and REPL scripts.
///
/// [`Segment`]: crate::Segment
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The script applied its effect.
    Success,
    /// The counter hash for the key does not exist yet.
    Uninitialized,
    /// The current window has no ids left.
    Overflow,
    /// The script arguments were rejected.
    BadParameter,
    /// REPL refused bounds that would move the window backwards.
    StaleBounds,
    /// Anything the protocol does not define.
    Unknown,
}

impl Code {
    /// Maps a wire code to its status. Unrecognised codes become
    /// [`Code::Unknown`].
    pub const fn from_wire(code: i64) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Uninitialized,
            2 => Self::Overflow,
            3 => Self::BadParameter,
            4 => Self::StaleBounds,
            _ => Self::Unknown,
        }
    }

    /// The wire representation of this status. [`Code::Unknown`] maps to
    /// `-1`, which [`Code::from_wire`] maps back.
    pub const fn to_wire(self) -> i64 {
        match self {
            Self::Success => 0,
            Self::Uninitialized => 1,
            Self::Overflow => 2,
            Self::BadParameter => 3,
            Self::StaleBounds => 4,
            Self::Unknown => -1,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
