use std::fmt;

/// Logical time used to decide whether a cached object is visible.
pub type Timestamp = u64;

/// Numeric identity of a schema object, unique within its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const INVALID: ObjectId = ObjectId(u32::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

impl From<u32> for ObjectId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for u32 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Declares a fieldless enum stored as a `u32`, with its name, `ALL` list and conversions.
#[macro_export]
macro_rules! u32_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $raw:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[repr(u32)]
        pub enum $name {
            $($variant = $raw,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> u32 {
                v as u32
            }
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(raw: u32) -> ::core::result::Result<Self, u32> {
                match raw {
                    $($raw => Ok(Self::$variant),)*
                    _ => Err(raw),
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

u32_enum! {
    /// Kind of schema object. Also names the catalog store an object lives in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum Category {
        Unknown = 0,
        Database = 1,
        Table = 2,
        Column = 3,
        Constraint = 4,
        Index = 5,
        Key = 6,
        File = 7,
        Field = 8,
        Area = 9,
        AreaContent = 10,
        Cascade = 11,
        Partition = 12,
        Function = 13,
        Privilege = 14,
    }
}

u32_enum! {
    /// Lifetime class of an object. Only `Permanent` and `Meta` objects reach a catalog store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Scope {
        Unknown = 0,
        Permanent = 1,
        SessionTemporary = 2,
        GlobalTemporary = 3,
        Meta = 4,
    }
}

impl Scope {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Permanent | Self::Meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_u32() {
        for c in Category::ALL {
            assert_eq!(Category::try_from(u32::from(*c)), Ok(*c));
        }
        assert_eq!(Category::try_from(99), Err(99));
    }

    #[test]
    fn invalid_id() {
        assert!(!ObjectId::INVALID.is_valid());
        assert!(ObjectId(0).is_valid());
        assert_eq!(ObjectId::default(), ObjectId::INVALID);
        assert_eq!(ObjectId::INVALID.to_string(), "<invalid>");
    }
}
