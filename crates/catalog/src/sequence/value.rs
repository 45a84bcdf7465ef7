use {
    byteorder::{ReadBytesExt, WriteBytesExt, LE},
    std::{
        cmp::Ordering,
        fmt,
        io::{Cursor, Result},
    },
};

/// A counter value in either signed or unsigned 32-bit form.
///
/// Values compare by magnitude across the two forms. `Invalid` marks a
/// sequence that has never been advanced and is unordered against numbers.
#[derive(Debug, Clone, Copy)]
pub enum SequenceValue {
    Invalid,
    Signed(i32),
    Unsigned(u32),
}

impl SequenceValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Invalid => None,
            Self::Signed(v) => Some(i64::from(*v)),
            Self::Unsigned(v) => Some(i64::from(*v)),
        }
    }

    pub(crate) fn from_i64(signed: bool, v: i64) -> Self {
        if signed {
            Self::Signed(v as i32)
        } else {
            Self::Unsigned(v as u32)
        }
    }

    /// Adds `increment`. The caller has checked with `is_able_to_add`.
    pub fn add(&self, increment: i32) -> Self {
        match self {
            Self::Invalid => Self::Invalid,
            Self::Signed(v) => Self::Signed(v.wrapping_add(increment)),
            Self::Unsigned(v) => Self::Unsigned(v.wrapping_add_signed(increment)),
        }
    }

    /// Whether adding `increment` stays within `bound`: at or below it for a
    /// positive increment, at or above it for a negative one.
    pub fn is_able_to_add(&self, increment: i32, bound: SequenceValue) -> bool {
        if increment == 1 {
            return matches!(self.partial_cmp(&bound), Some(Ordering::Less));
        }

        match (self.as_i64(), bound.as_i64()) {
            (Some(v), Some(bound)) => {
                let next = v + i64::from(increment);
                if increment > 0 {
                    next <= bound
                } else {
                    next >= bound
                }
            }
            _ => false,
        }
    }

    pub(crate) fn write(&self, bytes: &mut [u8]) -> Result<()> {
        let mut writer = Cursor::new(bytes);
        match self {
            Self::Invalid => writer.write_u8(0)?,
            Self::Signed(v) => {
                writer.write_u8(1)?;
                writer.write_i32::<LE>(*v)?
            }
            Self::Unsigned(v) => {
                writer.write_u8(2)?;
                writer.write_u32::<LE>(*v)?
            }
        }
        Ok(())
    }

    pub(crate) fn read(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);
        Ok(match reader.read_u8()? {
            1 => Self::Signed(reader.read_i32::<LE>()?),
            2 => Self::Unsigned(reader.read_u32::<LE>()?),
            _ => Self::Invalid,
        })
    }
}

impl PartialEq for SequenceValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Invalid, Self::Invalid) => true,
            _ => self.as_i64().is_some() && self.as_i64() == other.as_i64(),
        }
    }
}

impl PartialOrd for SequenceValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Invalid, Self::Invalid) => Some(Ordering::Equal),
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }
}

impl From<i32> for SequenceValue {
    fn from(v: i32) -> Self {
        Self::Signed(v)
    }
}

impl From<u32> for SequenceValue {
    fn from(v: u32) -> Self {
        Self::Unsigned(v)
    }
}

impl fmt::Display for SequenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_i64() {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("<invalid>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_across_forms() {
        assert_eq!(SequenceValue::Signed(5), SequenceValue::Unsigned(5));
        assert!(SequenceValue::Signed(-1) < SequenceValue::Unsigned(0));
        assert!(SequenceValue::Unsigned(u32::MAX) > SequenceValue::Signed(i32::MAX));
        assert_ne!(SequenceValue::Invalid, SequenceValue::Unsigned(0));
        assert_eq!(SequenceValue::Invalid.partial_cmp(&SequenceValue::Signed(0)), None);
    }

    #[test]
    fn able_to_add() {
        let max = SequenceValue::Unsigned(10);
        assert!(SequenceValue::Unsigned(9).is_able_to_add(1, max));
        assert!(!SequenceValue::Unsigned(10).is_able_to_add(1, max));
        assert!(SequenceValue::Unsigned(7).is_able_to_add(3, max));
        assert!(!SequenceValue::Unsigned(8).is_able_to_add(3, max));

        let min = SequenceValue::Signed(-10);
        assert!(SequenceValue::Signed(-5).is_able_to_add(-5, min));
        assert!(!SequenceValue::Signed(-6).is_able_to_add(-5, min));

        // an unsigned counter against a signed bound
        assert!(SequenceValue::Unsigned(3).is_able_to_add(-3, SequenceValue::Signed(0)));
        assert!(!SequenceValue::Invalid.is_able_to_add(1, max));
    }

    #[test]
    fn add_keeps_form() {
        assert!(matches!(SequenceValue::Unsigned(3).add(-1), SequenceValue::Unsigned(2)));
        assert!(matches!(SequenceValue::Signed(-3).add(2), SequenceValue::Signed(-1)));
    }

    #[test]
    fn page_bytes() -> Result<()> {
        let mut bytes = [0u8; 8];
        for v in [
            SequenceValue::Invalid,
            SequenceValue::Signed(-42),
            SequenceValue::Unsigned(42),
        ] {
            v.write(&mut bytes)?;
            let back = SequenceValue::read(&bytes)?;
            assert!(back == v);
        }
        Ok(())
    }
}
