//! # Bit-field packing
//!
//! [`BitCodec`] partitions the low bits of a `u64` into `N` named fields laid
//! out from **MSB to LSB** in declaration order:
//!
//! ```text
//!  Bit Index:  high bits                                       low bits
//!              +-------------+-------------+-----+-------------------+
//!  Field:      | fields[0]   | fields[1]   | ... | fields[N - 1]     |
//!              +-------------+-------------+-----+-------------------+
//!              |<------ MSB ---- total_bits() ---- LSB ------------->|
//! ```
//!
//! Every field's shift is the cumulative width of all fields after it, so the
//! last field always starts at bit 0. Widths may be zero; a zero-width field
//! always packs and unpacks as `0`.

use core::fmt;

use crate::{Error, Result};

/// Upper bound on the total width, keeping packed values non-negative when
/// reinterpreted as `i64`.
pub const MAX_TOTAL_BITS: u32 = 63;

/// The name and width of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: &'static str,
    pub bits: u32,
}

impl FieldSpec {
    pub const fn new(name: &'static str, bits: u32) -> Self {
        Self { name, bits }
    }
}

/// A value did not fit the field it was packed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOverflow {
    /// Index of the offending field.
    pub index: usize,
    pub value: u64,
    pub max: u64,
}

/// Pure pack/unpack of `N` fields into a single integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitCodec<const N: usize> {
    fields: [FieldSpec; N],
    shifts: [u32; N],
    total_bits: u32,
}

impl<const N: usize> BitCodec<N> {
    /// Builds a codec, rejecting any field wider than [`MAX_TOTAL_BITS`] or a
    /// layout whose widths sum past it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFieldWidth`] naming the first field that does
    /// not fit.
    pub fn new(fields: [FieldSpec; N]) -> Result<Self> {
        let mut shifts = [0; N];
        let mut offset = 0_u32;
        for (i, spec) in fields.iter().enumerate().rev() {
            if spec.bits > MAX_TOTAL_BITS || offset + spec.bits > MAX_TOTAL_BITS {
                return Err(Error::InvalidFieldWidth {
                    field: spec.name,
                    bits: spec.bits,
                });
            }
            shifts[i] = offset;
            offset += spec.bits;
        }
        Ok(Self {
            fields,
            shifts,
            total_bits: offset,
        })
    }

    /// Sum of all field widths.
    pub const fn total_bits(&self) -> u32 {
        self.total_bits
    }

    pub const fn fields(&self) -> &[FieldSpec; N] {
        &self.fields
    }

    pub const fn bits(&self, index: usize) -> u32 {
        self.fields[index].bits
    }

    /// Number of bits the field at `index` is shifted left by.
    pub const fn shift(&self, index: usize) -> u32 {
        self.shifts[index]
    }

    /// Largest value the field at `index` can hold.
    pub const fn max(&self, index: usize) -> u64 {
        mask(self.fields[index].bits)
    }

    pub const fn fits(&self, index: usize, value: u64) -> bool {
        value <= self.max(index)
    }

    /// Packs `values`, failing on the first value that overflows its field.
    ///
    /// # Errors
    ///
    /// Returns the index, value and limit of the first overflowing field.
    pub fn pack(&self, values: [u64; N]) -> core::result::Result<u64, FieldOverflow> {
        for (index, &value) in values.iter().enumerate() {
            if !self.fits(index, value) {
                return Err(FieldOverflow {
                    index,
                    value,
                    max: self.max(index),
                });
            }
        }
        Ok(self.pack_masked(values))
    }

    /// Packs `values` by shift-and-OR, masking each one to its field width.
    ///
    /// Callers are expected to have validated the values already; overflow is
    /// only caught by a debug assertion.
    pub fn pack_masked(&self, values: [u64; N]) -> u64 {
        let mut raw = 0;
        for (index, &value) in values.iter().enumerate() {
            debug_assert!(self.fits(index, value), "{} overflow", self.fields[index].name);
            raw |= (value & self.max(index)) << self.shifts[index];
        }
        raw
    }

    /// Splits `raw` back into its fields. Bits above [`Self::total_bits`]
    /// are ignored.
    pub fn unpack(&self, raw: u64) -> [u64; N] {
        let mut values = [0; N];
        for (index, value) in values.iter_mut().enumerate() {
            *value = (raw >> self.shifts[index]) & self.max(index);
        }
        values
    }

    /// Describes `raw` field by field, for [`write_layout_table`].
    pub fn layout(&self, raw: u64) -> [FieldLayout; N] {
        let values = self.unpack(raw);
        let mut out = [FieldLayout::default(); N];
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = FieldLayout {
                name: self.fields[index].name,
                bits: self.fields[index].bits,
                value: values[index],
            };
        }
        out
    }
}

const fn mask(bits: u32) -> u64 {
    if bits == 0 { 0 } else { u64::MAX >> (64 - bits) }
}

/// One decoded field, as rendered by [`write_layout_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub bits: u32,
    pub value: u64,
}

/// Renders a boxed table of the non-empty fields of `raw`.
///
/// ```text
/// SnowflakeFields {
///     raw id     : 0x0000000000001234 (4660)
///     layout     :
///         +----------+-----------+
///         | time (41)| gene (4)  |
///         ...
/// }
/// ```
pub fn write_layout_table(
    f: &mut fmt::Formatter<'_>,
    type_name: &str,
    raw: u64,
    fields: &[FieldLayout],
) -> fmt::Result {
    let visible_fields: Vec<_> = fields.iter().filter(|field| field.bits > 0).collect();

    // Compute max width per column: label, dec, hex
    let columns: Vec<usize> = visible_fields
        .iter()
        .map(|field| {
            let label_len = format!("{} ({})", field.name, field.bits).len();
            let dec_len = field.value.to_string().len();
            let hex_len = format!("0x{:x}", field.value).len();
            label_len.max(dec_len).max(hex_len) + 2 // +2 for padding
        })
        .collect();

    fn center(s: impl ToString, width: usize) -> String {
        let s = s.to_string();
        let len = s.len();
        if len >= width {
            return s;
        }
        let pad = width - len;
        let left = pad / 2;
        let right = pad - left;
        format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
    }

    fn border(f: &mut fmt::Formatter<'_>, columns: &[usize]) -> fmt::Result {
        write!(f, "        +")?;
        for &w in columns {
            write!(f, "{}+", "-".repeat(w))?;
        }
        writeln!(f)
    }

    writeln!(f, "{type_name} {{")?;
    writeln!(f, "    raw id     : 0x{raw:016x} ({raw})")?;
    writeln!(f, "    layout     :")?;

    border(f, &columns)?;
    write!(f, "        |")?;
    for (field, &w) in visible_fields.iter().zip(&columns) {
        write!(f, "{}|", center(format!("{} ({})", field.name, field.bits), w))?;
    }
    writeln!(f)?;
    border(f, &columns)?;

    write!(f, "        |")?;
    for (field, &w) in visible_fields.iter().zip(&columns) {
        write!(f, "{}|", center(field.value, w))?;
    }
    writeln!(f)?;

    write!(f, "        |")?;
    for (field, &w) in visible_fields.iter().zip(&columns) {
        write!(f, "{}|", center(format!("0x{:x}", field.value), w))?;
    }
    writeln!(f)?;
    border(f, &columns)?;

    write!(f, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> BitCodec<3> {
        BitCodec::new([
            FieldSpec::new("high", 5),
            FieldSpec::new("mid", 3),
            FieldSpec::new("low", 8),
        ])
        .unwrap()
    }

    #[test]
    fn shifts_are_cumulative_from_the_low_end() {
        let codec = codec();
        assert_eq!(codec.total_bits(), 16);
        assert_eq!(codec.shift(2), 0);
        assert_eq!(codec.shift(1), 8);
        assert_eq!(codec.shift(0), 11);
        assert_eq!(codec.max(0), 31);
        assert_eq!(codec.max(1), 7);
        assert_eq!(codec.max(2), 255);
    }

    #[test]
    fn pack_places_fields_msb_first() {
        let codec = codec();
        let raw = codec.pack([1, 2, 3]).unwrap();
        assert_eq!(raw, (1 << 11) | (2 << 8) | 3);
        assert_eq!(codec.unpack(raw), [1, 2, 3]);

        let max = codec.pack([31, 7, 255]).unwrap();
        assert_eq!(max, (1 << 16) - 1);
        assert_eq!(codec.unpack(max), [31, 7, 255]);
    }

    #[test]
    fn pack_reports_first_overflowing_field() {
        let err = codec().pack([0, 8, 256]).unwrap_err();
        assert_eq!(
            err,
            FieldOverflow {
                index: 1,
                value: 8,
                max: 7
            }
        );
    }

    #[test]
    fn zero_width_fields_are_inert() {
        let codec = BitCodec::new([
            FieldSpec::new("a", 4),
            FieldSpec::new("empty", 0),
            FieldSpec::new("b", 4),
        ])
        .unwrap();
        assert_eq!(codec.max(1), 0);
        assert!(codec.pack([1, 1, 1]).is_err());
        assert_eq!(codec.unpack(codec.pack([9, 0, 6]).unwrap()), [9, 0, 6]);
    }

    #[test]
    fn full_width_layout_uses_63_bits() {
        let codec = BitCodec::new([FieldSpec::new("all", 63)]).unwrap();
        assert_eq!(codec.max(0), i64::MAX as u64);
    }

    #[test]
    fn rejects_layouts_wider_than_63_bits() {
        let err = BitCodec::new([FieldSpec::new("a", 40), FieldSpec::new("b", 24)]).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldWidth { bits: 40, .. }));

        let err = BitCodec::new([FieldSpec::new("a", 64)]).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldWidth { bits: 64, .. }));
    }

    #[test]
    fn unpack_ignores_bits_above_the_layout() {
        let codec = codec();
        assert_eq!(codec.unpack(u64::MAX), [31, 7, 255]);
    }
}
