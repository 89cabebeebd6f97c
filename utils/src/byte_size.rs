use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const DECIMAL_UNITS: [(&str, u64); 4] = [
    ("tb", 1_000_000_000_000),
    ("gb", 1_000_000_000),
    ("mb", 1_000_000),
    ("kb", 1_000),
];

const BINARY_UNITS: [(&str, u64); 4] = [("tib", 1 << 40), ("gib", 1 << 30), ("mib", 1 << 20), ("kib", 1 << 10)];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ByteSizeParseError {
    #[error("empty size string")]
    Empty,

    #[error("invalid number in size string {0:?}")]
    InvalidNumber(String),

    #[error("unknown size unit {0:?}; expected one of b, kb, mb, gb, tb, kib, mib, gib, tib")]
    UnknownUnit(String),

    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// A number of bytes that can be given by users as a human readable string.
///
/// Decimal units (`kb`, `mb`, `gb`, `tb`, or the single letters `k`, `m`, `g`, `t`) are powers of 1000;
/// binary units (`kib`, `mib`, `gib`, `tib`) are powers of 1024.  Parsing is case insensitive and
/// whitespace between the number and the unit is allowed, so "1GiB", "1 gib" and "1073741824" are
/// the same size.  A fractional number is accepted as long as the result is a whole number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn new(n_bytes: u64) -> Self {
        Self(n_bytes)
    }

    pub const fn kib(n: u64) -> Self {
        Self(n << 10)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n << 20)
    }

    pub const fn gib(n: u64) -> Self {
        Self(n << 30)
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(n_bytes: u64) -> Self {
        Self(n_bytes)
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "" | "b" => Some(1),
        "k" => Some(1_000),
        "m" => Some(1_000_000),
        "g" => Some(1_000_000_000),
        "t" => Some(1_000_000_000_000),
        _ => DECIMAL_UNITS
            .iter()
            .chain(BINARY_UNITS.iter())
            .find(|(name, _)| *name == unit)
            .map(|(_, mult)| *mult),
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() {
            return Err(ByteSizeParseError::Empty);
        }

        let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let unit = unit.trim();

        if number.is_empty() {
            return Err(ByteSizeParseError::InvalidNumber(s.clone()));
        }

        let multiplier = unit_multiplier(unit).ok_or_else(|| ByteSizeParseError::UnknownUnit(unit.to_owned()))?;

        match number.split_once('.') {
            None => {
                let n: u64 = number.parse().map_err(|_| ByteSizeParseError::InvalidNumber(s.clone()))?;
                n.checked_mul(multiplier)
                    .map(ByteSize)
                    .ok_or_else(|| ByteSizeParseError::Overflow(s.clone()))
            },
            Some((whole, frac)) => {
                let value: f64 = number.parse().map_err(|_| ByteSizeParseError::InvalidNumber(s.clone()))?;
                if whole.is_empty() && frac.is_empty() {
                    return Err(ByteSizeParseError::InvalidNumber(s.clone()));
                }
                let n_bytes = value * multiplier as f64;
                if !n_bytes.is_finite() || n_bytes >= u64::MAX as f64 {
                    return Err(ByteSizeParseError::Overflow(s.clone()));
                }
                if n_bytes.fract() != 0.0 {
                    return Err(ByteSizeParseError::InvalidNumber(s.clone()));
                }
                Ok(ByteSize(n_bytes as u64))
            },
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 {
            for (name, mult) in BINARY_UNITS.iter() {
                if self.0 % mult == 0 {
                    let unit = match *name {
                        "tib" => "TiB",
                        "gib" => "GiB",
                        "mib" => "MiB",
                        _ => "KiB",
                    };
                    return write!(f, "{}{}", self.0 / mult, unit);
                }
            }
            for (name, mult) in DECIMAL_UNITS.iter() {
                if self.0 % mult == 0 {
                    return write!(f, "{}{}", self.0 / mult, name.to_ascii_uppercase());
                }
            }
        }
        write!(f, "{}B", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!("4".parse::<ByteSize>().unwrap().as_u64(), 4);
        assert_eq!("4b".parse::<ByteSize>().unwrap().as_u64(), 4);
        assert_eq!(" 1073741824 ".parse::<ByteSize>().unwrap(), ByteSize::gib(1));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("1mb".parse::<ByteSize>().unwrap().as_u64(), 1_000_000);
        assert_eq!("1MiB".parse::<ByteSize>().unwrap().as_u64(), 1 << 20);
        assert_eq!("1 GiB".parse::<ByteSize>().unwrap(), ByteSize::gib(1));
        assert_eq!("64kib".parse::<ByteSize>().unwrap(), ByteSize::kib(64));
        assert_eq!("2k".parse::<ByteSize>().unwrap().as_u64(), 2_000);
        assert_eq!("1.5kib".parse::<ByteSize>().unwrap().as_u64(), 1536);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ByteSize>(), Err(ByteSizeParseError::Empty));
        assert!(matches!("gb".parse::<ByteSize>(), Err(ByteSizeParseError::InvalidNumber(_))));
        assert!(matches!("12 parsecs".parse::<ByteSize>(), Err(ByteSizeParseError::UnknownUnit(_))));
        assert!(matches!("1.1b".parse::<ByteSize>(), Err(ByteSizeParseError::InvalidNumber(_))));
        assert!(matches!("100000000tib".parse::<ByteSize>(), Err(ByteSizeParseError::Overflow(_))));
        assert!(matches!("-5".parse::<ByteSize>(), Err(ByteSizeParseError::InvalidNumber(_))));
    }

    #[test]
    fn test_display_reparses() {
        for size in [
            ByteSize::new(0),
            ByteSize::new(10),
            ByteSize::kib(3),
            ByteSize::gib(1),
            ByteSize::new(5_000_000),
            ByteSize::new(1_234_567),
        ] {
            let s = size.to_string();
            assert_eq!(s.parse::<ByteSize>().unwrap(), size, "{s}");
        }
        assert_eq!(ByteSize::gib(1).to_string(), "1GiB");
        assert_eq!(ByteSize::new(5_000_000).to_string(), "5MB");
    }
}
