use core::fmt;

use crate::{BitCodec, Error, FieldLayout, FieldSpec, Result, write_layout_table};

const TIME: usize = 0;
const CLOCK: usize = 1;
const SEQUENCE: usize = 2;
const MACHINE: usize = 3;
const GENE: usize = 4;

/// Total width every composite ID layout must add up to.
pub const COMPOSITE_BITS: u32 = 63;

/// Widest allowed sequence or machine field.
pub const MAX_SEQUENCE_OR_MACHINE_BITS: u32 = 16;

/// Bit layout of a composite ID.
///
/// Fields are packed from **MSB to LSB**; the sign bit is never used:
///
/// ```text
///  Bit Index:  63   62                                                  0
///              +---+------+-------+----------+---------+------+
///  Field:      | 0 | time | clock | sequence | machine | gene |
///              +---+------+-------+----------+---------+------+
///              |<------------- MSB ---- 64 bits ---- LSB -------------->|
/// ```
///
/// The default layout is `time: 41, clock: 1, sequence: 10, machine: 7,
/// gene: 4`. The clock field is reserved and always packs as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    codec: BitCodec<5>,
}

/// The decoded fields of a composite ID.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fields {
    /// Elapsed time units since the epoch.
    pub time: u64,
    pub clock: u64,
    pub sequence: u64,
    pub machine: u64,
    pub gene: u64,
}

impl Default for Layout {
    fn default() -> Self {
        // 41 + 1 + 10 + 7 + 4 == 63 is checked by `layout_default_is_valid`.
        let codec = BitCodec::new(Self::specs(41, 1, 10, 7, 4));
        match codec {
            Ok(codec) => Self { codec },
            Err(_) => unreachable!("default layout is valid"),
        }
    }
}

impl Layout {
    /// Validates and builds a layout from its five field widths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFieldWidth`] if the sequence or machine width
    /// lies outside `[0, 16]`, or if the widths do not sum to exactly 63.
    pub fn new(time: u32, clock: u32, sequence: u32, machine: u32, gene: u32) -> Result<Self> {
        if sequence > MAX_SEQUENCE_OR_MACHINE_BITS {
            return Err(Error::InvalidFieldWidth {
                field: "sequence",
                bits: sequence,
            });
        }
        if machine > MAX_SEQUENCE_OR_MACHINE_BITS {
            return Err(Error::InvalidFieldWidth {
                field: "machine",
                bits: machine,
            });
        }
        let total = [time, clock, sequence, machine, gene]
            .iter()
            .fold(0_u32, |acc, bits| acc.saturating_add(*bits));
        if total != COMPOSITE_BITS {
            return Err(Error::InvalidFieldWidth {
                field: "total",
                bits: total,
            });
        }
        let codec = BitCodec::new(Self::specs(time, clock, sequence, machine, gene))?;
        Ok(Self { codec })
    }

    const fn specs(
        time: u32,
        clock: u32,
        sequence: u32,
        machine: u32,
        gene: u32,
    ) -> [FieldSpec; 5] {
        [
            FieldSpec::new("time", time),
            FieldSpec::new("clock", clock),
            FieldSpec::new("sequence", sequence),
            FieldSpec::new("machine", machine),
            FieldSpec::new("gene", gene),
        ]
    }

    pub const fn time_bits(&self) -> u32 {
        self.codec.bits(TIME)
    }

    pub const fn clock_bits(&self) -> u32 {
        self.codec.bits(CLOCK)
    }

    pub const fn sequence_bits(&self) -> u32 {
        self.codec.bits(SEQUENCE)
    }

    pub const fn machine_bits(&self) -> u32 {
        self.codec.bits(MACHINE)
    }

    pub const fn gene_bits(&self) -> u32 {
        self.codec.bits(GENE)
    }

    pub const fn max_time(&self) -> u64 {
        self.codec.max(TIME)
    }

    pub const fn max_sequence(&self) -> u64 {
        self.codec.max(SEQUENCE)
    }

    pub const fn max_machine(&self) -> u64 {
        self.codec.max(MACHINE)
    }

    pub const fn max_gene(&self) -> u64 {
        self.codec.max(GENE)
    }

    /// `2^gene_bits`, the modulus handed to gene functions.
    pub const fn gene_modulus(&self) -> u64 {
        self.max_gene() + 1
    }

    /// Checks that `machine_id` fits the machine field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMachineId`] when it does not.
    pub const fn check_machine_id(&self, machine_id: u64) -> Result<()> {
        if machine_id > self.max_machine() {
            Err(Error::InvalidMachineId)
        } else {
            Ok(())
        }
    }

    /// Builds a composite ID from explicit components.
    ///
    /// # Errors
    ///
    /// Each out-of-range component fails with its own error:
    /// [`Error::InvalidTime`], [`Error::InvalidSequence`],
    /// [`Error::InvalidMachineId`] or [`Error::InvalidGene`].
    pub fn compose(&self, time: u64, sequence: u64, machine: u64, gene: u64) -> Result<i64> {
        let raw = self
            .codec
            .pack([time, 0, sequence, machine, gene])
            .map_err(|overflow| match overflow.index {
                TIME => Error::InvalidTime,
                SEQUENCE => Error::InvalidSequence,
                MACHINE => Error::InvalidMachineId,
                _ => Error::InvalidGene,
            })?;
        Ok(to_signed(raw))
    }

    /// Packs already-validated components. Hot path of ID generation.
    pub(crate) fn pack(&self, time: u64, sequence: u64, machine: u64, gene: u64) -> i64 {
        to_signed(self.codec.pack_masked([time, 0, sequence, machine, gene]))
    }

    /// Splits a composite ID back into its fields.
    pub fn decompose(&self, id: i64) -> Fields {
        let [time, clock, sequence, machine, gene] = self.codec.unpack(id as u64);
        Fields {
            time,
            clock,
            sequence,
            machine,
            gene,
        }
    }

    /// A printable, table-formatted breakdown of `id`.
    pub fn describe(&self, id: i64) -> Described {
        let raw = id as u64;
        Described {
            raw,
            fields: self.codec.layout(raw),
        }
    }
}

// The layout never exceeds 63 bits, so the sign bit is always clear.
const fn to_signed(raw: u64) -> i64 {
    debug_assert!(raw <= i64::MAX as u64);
    raw as i64
}

/// Table view of a composite ID, see [`Layout::describe`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Described {
    raw: u64,
    fields: [FieldLayout; 5],
}

impl fmt::Display for Described {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_layout_table(f, "CompositeId", self.raw, &self.fields)
    }
}

impl fmt::Debug for Described {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
