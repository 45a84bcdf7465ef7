use {
    crate::ObjectId,
    core::{cmp::Ordering, mem::size_of},
};

trait ByteCount {
    fn byte_count(&self) -> usize;
}

macro_rules! fixed_byte_count {
    ($($raw:ty,)*) => {
        $(
            impl ByteCount for $raw {
                fn byte_count(&self) -> usize {
                    size_of::<$raw>()
                }
            }
        )*
    };
}

fixed_byte_count! { bool, i32, u32, i64, u64, }

impl ByteCount for String {
    fn byte_count(&self) -> usize {
        self.len()
    }
}

// Arrays carry a u16 element count, strings inside carry a u16 length each.
impl ByteCount for Vec<String> {
    fn byte_count(&self) -> usize {
        self.iter().map(|s| s.len() + 2).sum::<usize>() + 2
    }
}

impl ByteCount for Vec<u32> {
    fn byte_count(&self) -> usize {
        self.len() * size_of::<u32>() + 2
    }
}

macro_rules! define_value {
    ($($variant:ident($raw:ty) = $tag:literal,)*) => {
        /// A single field of a catalog tuple.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Value {
            Null,
            $($variant($raw),)*
        }

        impl Value {
            pub const NULL_TAG: u8 = 0;

            /// Bytes taken by the payload, excluding the type tag.
            pub fn byte_count(&self) -> usize {
                match self {
                    Self::Null => 0,
                    $(Self::$variant(v) => v.byte_count(),)*
                }
            }

            pub fn tag(&self) -> u8 {
                match self {
                    Self::Null => Self::NULL_TAG,
                    $(Self::$variant(_) => $tag,)*
                }
            }

            pub fn type_name(&self) -> &'static str {
                match self {
                    Self::Null => "Null",
                    $(Self::$variant(_) => stringify!($variant),)*
                }
            }
        }
    };
}

define_value! {
    Boolean(bool) = 1,
    Int(i32) = 2,
    Uint(u32) = 3,
    BigInt(i64) = 4,
    BigUint(u64) = 5,
    String(String) = 6,
    StringArray(Vec<String>) = 7,
    UintArray(Vec<u32>) = 8,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,

            (Self::Boolean(v1), Self::Boolean(v2)) => v1.cmp(v2),
            (Self::Int(v1), Self::Int(v2)) => v1.cmp(v2),
            (Self::Uint(v1), Self::Uint(v2)) => v1.cmp(v2),
            (Self::BigInt(v1), Self::BigInt(v2)) => v1.cmp(v2),
            (Self::BigUint(v1), Self::BigUint(v2)) => v1.cmp(v2),
            (Self::String(v1), Self::String(v2)) => v1.cmp(v2),
            (Self::StringArray(v1), Self::StringArray(v2)) => v1.cmp(v2),
            (Self::UintArray(v1), Self::UintArray(v2)) => v1.cmp(v2),

            (Self::Int(v1), Self::Uint(v2)) => i64::from(*v1).cmp(&i64::from(*v2)),
            (Self::Uint(v1), Self::Int(v2)) => i64::from(*v1).cmp(&i64::from(*v2)),

            (v1, v2) => panic!(
                "Cannot compare values of different types: {:?}, {:?}",
                v1, v2
            ),
        }
    }
}

macro_rules! value_conversions {
    ($(($raw:ty, $val:ident),)*) => {
        $(
            impl From<$raw> for Value {
                fn from(raw: $raw) -> Self {
                    Value::$val(raw)
                }
            }
        )*
    };
}

value_conversions! {
    (bool, Boolean),
    (i32, Int),
    (u32, Uint),
    (i64, BigInt),
    (u64, BigUint),
    (String, String),
    (Vec<String>, StringArray),
    (Vec<u32>, UintArray),
}

impl From<&str> for Value {
    fn from(raw: &str) -> Self {
        Value::String(raw.to_string())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Uint(id.0)
    }
}
