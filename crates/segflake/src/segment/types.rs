use core::{
    iter::{Chain, Flatten},
    ops::RangeInclusive,
};

use crate::Code;

/// One allocation outcome.
///
/// The ids reserved for the caller are `min_id..=cursor`; `max_id` is the
/// upper bound of the window the segment was cut from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub code: Code,
    pub min_id: i64,
    pub max_id: i64,
    pub cursor: i64,
}

impl Segment {
    pub const fn new(code: Code, min_id: i64, max_id: i64, cursor: i64) -> Self {
        Self {
            code,
            min_id,
            max_id,
            cursor,
        }
    }

    /// Number of ids reserved by this segment.
    pub const fn len(&self) -> u64 {
        if self.cursor < self.min_id {
            0
        } else {
            self.cursor.abs_diff(self.min_id).saturating_add(1)
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The reserved ids, in ascending order.
    pub const fn ids(&self) -> RangeInclusive<i64> {
        self.min_id..=self.cursor
    }
}

/// One logical reservation of `num` ids.
///
/// When the cache window boundary falls inside a request, the ids are split
/// across a `primary` and a `supplemental` segment. The two are one
/// reservation by count only; their ranges need not be adjacent.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub primary: Segment,
    pub supplemental: Option<Segment>,
}

impl Allocation {
    pub const fn single(primary: Segment) -> Self {
        Self {
            primary,
            supplemental: None,
        }
    }

    /// Total number of ids across both segments.
    pub fn len(&self) -> u64 {
        self.primary
            .len()
            .saturating_add(self.supplemental.map_or(0, |segment| segment.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every reserved id: the primary segment first, then the supplemental.
    pub fn ids(&self) -> AllocationIds {
        self.primary
            .ids()
            .chain(self.supplemental.map(|segment| segment.ids()).into_iter().flatten())
    }
}

/// Iterator over the ids of an [`Allocation`].
pub type AllocationIds =
    Chain<RangeInclusive<i64>, Flatten<core::option::IntoIter<RangeInclusive<i64>>>>;

impl IntoIterator for Allocation {
    type Item = i64;
    type IntoIter = AllocationIds;

    fn into_iter(self) -> Self::IntoIter {
        self.ids()
    }
}
