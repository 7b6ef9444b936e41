/*!
`decimal(P,S)` values: an arbitrary-precision unscaled integer plus a fixed
scale, matching Iceberg's requirement that decimal values be stored in the
minimum number of bytes needed for the given precision (see
[`super::schema::PrimitiveType::Decimal`]).
*/
use num_bigint::BigInt;
use std::fmt;

use crate::error::{IcebergError, Result};

/// Maximum precision representable by Iceberg's fixed-width decimal
/// encoding, indexed by the number of bytes used to store the unscaled
/// value (`bytes - 1` is the array index, matching the Java implementation's
/// `maxPrecision` table).
const MAX_PRECISION: [u32; 24] = [
    2, 4, 6, 9, 11, 14, 16, 18, 21, 23, 26, 28, 31, 33, 35, 38, 40, 43, 45, 48, 50, 53, 55, 58,
];

/// The minimum number of bytes required to hold an unscaled value with the
/// given precision, i.e. the inverse of [`MAX_PRECISION`].
pub fn required_bytes_for_precision(precision: u32) -> Result<usize> {
    MAX_PRECISION
        .iter()
        .position(|&max| precision <= max)
        .map(|idx| idx + 1)
        .ok_or_else(|| IcebergError::Validation(format!("precision {precision} exceeds decimal(38) range")))
}

/// An arbitrary-precision decimal value: `unscaled * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    precision: u32,
    scale: u32,
}

impl Decimal {
    /// Construct a `Decimal`, validating that `unscaled` fits within
    /// `precision` decimal digits.
    pub fn new(unscaled: BigInt, precision: u32, scale: u32) -> Result<Self> {
        let digits = unscaled.to_string().trim_start_matches('-').len() as u32;
        if digits > precision {
            return Err(IcebergError::Validation(format!(
                "unscaled value {unscaled} has more than {precision} digits"
            )));
        }
        Ok(Decimal {
            unscaled,
            precision,
            scale,
        })
    }

    /// The underlying unscaled integer value.
    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    /// The declared precision (total number of decimal digits).
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// The declared scale (number of digits after the decimal point).
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Big-endian two's-complement encoding using the minimum number of
    /// bytes for this value's precision, per the Iceberg binary
    /// single-value spec for `decimal`.
    pub fn to_be_bytes(&self) -> Result<Vec<u8>> {
        let width = required_bytes_for_precision(self.precision)?;
        let (sign, mut bytes) = self.unscaled.to_bytes_be();
        if bytes.len() > width {
            return Err(IcebergError::Validation(format!(
                "decimal value does not fit in {width} bytes"
            )));
        }
        let pad = if sign == num_bigint::Sign::Minus {
            0xffu8
        } else {
            0x00u8
        };
        let mut out = vec![pad; width - bytes.len()];
        if sign == num_bigint::Sign::Minus {
            // two's complement: invert the magnitude bytes and add one, done
            // in the padded big-endian field directly.
            out.extend_from_slice(&bytes);
            twos_complement_in_place(&mut out);
        } else {
            out.append(&mut bytes);
        }
        Ok(out)
    }

    /// Decode a big-endian two's-complement decimal encoded for the given
    /// precision and scale.
    pub fn from_be_bytes(bytes: &[u8], precision: u32, scale: u32) -> Result<Self> {
        if bytes.is_empty() {
            return Err(IcebergError::Validation("empty decimal encoding".to_string()));
        }
        let negative = bytes[0] & 0x80 != 0;
        let unscaled = if negative {
            let mut inv = bytes.to_vec();
            twos_complement_in_place(&mut inv);
            -BigInt::from_bytes_be(num_bigint::Sign::Plus, &inv)
        } else {
            BigInt::from_bytes_be(num_bigint::Sign::Plus, bytes)
        };
        Decimal::new(unscaled, precision, scale)
    }
}

fn twos_complement_in_place(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = !*b;
    }
    for b in bytes.iter_mut().rev() {
        let (sum, carry) = b.overflowing_add(1);
        *b = sum;
        if !carry {
            break;
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.to_string();
        let negative = digits.starts_with('-');
        let digits = digits.trim_start_matches('-');
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{:0>width$}", digits, width = scale + 1)
        } else {
            digits.to_string()
        };
        let split = padded.len() - scale;
        let (int_part, frac_part) = padded.split_at(split);
        if negative {
            write!(f, "-")?;
        }
        if scale == 0 {
            write!(f, "{int_part}")
        } else {
            write!(f, "{int_part}.{frac_part}")
        }
    }
}
