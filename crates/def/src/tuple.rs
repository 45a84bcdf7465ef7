use {
    crate::Value,
    snafu::{prelude::*, Backtrace},
};

/// Field values of one catalog record, in column order.
pub type Tuple = Vec<Value>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{record} expects {expected} fields, got {actual}"))]
    FieldCount {
        record: &'static str,
        expected: usize,
        actual: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("field {record}.{field} holds an unexpected {found} value"))]
    FieldType {
        record: &'static str,
        field: &'static str,
        found: &'static str,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Declares plain data structs that convert to and from a [`Tuple`].
///
/// Every field names the Rust type and the [`Value`] variant it is stored as.
/// Conversions go through `Into`/`TryFrom`, so newtypes such as `ObjectId`
/// or enums with a `u32` representation can be stored as `Uint`.
#[macro_export]
macro_rules! tuple_struct {
    (
        $(
            $(#[$meta:meta])*
            struct $name:ident {
                $($prop:ident: ($ty:ty, $variant:ident),)*
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            pub struct $name {
                $(pub $prop: $ty,)*
            }

            impl $name {
                pub const FIELDS: &'static [&'static str] = &[$(stringify!($prop),)*];
            }

            impl From<$name> for $crate::Tuple {
                fn from(record: $name) -> Self {
                    vec![$($crate::Value::$variant(record.$prop.into()),)*]
                }
            }

            impl TryFrom<$crate::Tuple> for $name {
                type Error = $crate::tuple::Error;

                fn try_from(values: $crate::Tuple) -> $crate::tuple::Result<Self> {
                    snafu::ensure!(
                        values.len() == Self::FIELDS.len(),
                        $crate::tuple::FieldCountSnafu {
                            record: stringify!($name),
                            expected: Self::FIELDS.len(),
                            actual: values.len(),
                        }
                    );

                    let mut values = values.into_iter();
                    $(
                        let $prop = {
                            let value = values.next().unwrap_or($crate::Value::Null);
                            let found = value.type_name();
                            match value {
                                $crate::Value::$variant(raw) => <$ty>::try_from(raw).ok(),
                                _ => None,
                            }
                            .ok_or_else(|| {
                                $crate::tuple::FieldTypeSnafu {
                                    record: stringify!($name),
                                    field: stringify!($prop),
                                    found,
                                }
                                .build()
                            })?
                        };
                    )*

                    Ok(Self { $($prop,)* })
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use crate::{ObjectId, Scope, Tuple, Value};

    tuple_struct! {
        #[derive(Debug, Clone, PartialEq)]
        struct Sample {
            owner: (ObjectId, Uint),
            scope: (Scope, Uint),
            label: (String, String),
            paths: (Vec<String>, StringArray),
        }
    }

    #[test]
    fn convert_both_ways() -> super::Result<()> {
        let sample = Sample {
            owner: ObjectId(4),
            scope: Scope::Permanent,
            label: "t1".to_string(),
            paths: vec!["/a".to_string()],
        };

        let tuple: Tuple = sample.clone().into();
        assert_eq!(tuple[0], Value::Uint(4));
        assert_eq!(tuple[1], Value::Uint(1));
        assert_eq!(Sample::try_from(tuple)?, sample);
        Ok(())
    }

    #[test]
    fn mismatches_are_reported() {
        let short = vec![Value::Uint(1)];
        assert!(matches!(
            Sample::try_from(short),
            Err(super::Error::FieldCount { expected: 4, actual: 1, .. })
        ));

        let wrong = vec![
            Value::Uint(1),
            Value::Uint(77),
            Value::from("x"),
            Value::StringArray(vec![]),
        ];
        assert!(matches!(
            Sample::try_from(wrong),
            Err(super::Error::FieldType { field: "scope", .. })
        ));
    }
}
