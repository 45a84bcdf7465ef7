use {
    crate::{Tuple, Value},
    byteorder::{ReadBytesExt, WriteBytesExt, LE},
    common::dsa::bitmap::{byte_len, Bitmap, BitmapMut},
    snafu::{prelude::*, Backtrace},
    std::{
        io::{self, Cursor, Read, Write},
        string::FromUtf8Error,
    },
};

pub trait Encoder {
    type Item;
    type Error;

    fn encode(&self, item: &Self::Item) -> std::result::Result<Vec<u8>, Self::Error>;
}

pub trait Decoder {
    type Item;
    type Error;

    /// Returns the decoded item and the count of bytes consumed.
    fn decode(&self, src: &[u8]) -> std::result::Result<(Self::Item, usize), Self::Error>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("unknown value tag {tag}"))]
    UnknownTag { tag: u8, backtrace: Backtrace },

    #[snafu(display("invalid boolean byte {byte}"))]
    InvalidBoolean { byte: u8, backtrace: Backtrace },

    #[snafu(display("{what} is too long to encode: {len}"))]
    TooLong {
        what: &'static str,
        len: usize,
        backtrace: Backtrace,
    },

    Io {
        source: io::Error,
        backtrace: Backtrace,
    },

    Utf8Encoding {
        source: FromUtf8Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Self-describing tuple layout:
/// `u16 field count | null bitmap | (u8 tag, payload)` for every non-null field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TupleCodec;

impl Encoder for TupleCodec {
    type Item = Tuple;
    type Error = Error;

    fn encode(&self, values: &Tuple) -> Result<Vec<u8>> {
        let count = u16::try_from(values.len()).ok().context(TooLongSnafu {
            what: "tuple",
            len: values.len(),
        })?;

        let bitmap_len = byte_len(values.len());
        let data_len = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.byte_count() + 1)
            .sum::<usize>();

        let mut bytes = Vec::with_capacity(2 + bitmap_len + data_len);
        bytes.write_u16::<LE>(count).context(IoSnafu)?;
        bytes.resize(2 + bitmap_len, 0);

        let mut bitmap = BitmapMut::new(&mut bytes[2..]);
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_null())
            .for_each(|(i, _)| bitmap.set(i));

        for v in values.iter().filter(|v| !v.is_null()) {
            bytes.write_u8(v.tag()).context(IoSnafu)?;
            bytes.write_value(v)?;
        }

        Ok(bytes)
    }
}

impl Decoder for TupleCodec {
    type Item = Tuple;
    type Error = Error;

    fn decode(&self, src: &[u8]) -> Result<(Tuple, usize)> {
        let mut reader = Cursor::new(src);
        let count = reader.read_u16::<LE>().context(IoSnafu)? as usize;

        let bitmap_len = byte_len(count);
        let mut bitmap_bytes = vec![0u8; bitmap_len];
        reader.read_exact(&mut bitmap_bytes).context(IoSnafu)?;
        let nulls = Bitmap::new(&bitmap_bytes);

        let values = (0..count)
            .map(|i| {
                if nulls.is_set(i) {
                    Ok(Value::Null)
                } else {
                    let tag = reader.read_u8().context(IoSnafu)?;
                    reader.read_value(tag)
                }
            })
            .collect::<Result<Tuple>>()?;

        Ok((values, reader.position() as usize))
    }
}

trait ReadValue: Read {
    fn read_value(&mut self, tag: u8) -> Result<Value> {
        Ok(match tag {
            1 => match self.read_u8().context(IoSnafu)? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                byte => return InvalidBooleanSnafu { byte }.fail(),
            },
            2 => Value::Int(self.read_i32::<LE>().context(IoSnafu)?),
            3 => Value::Uint(self.read_u32::<LE>().context(IoSnafu)?),
            4 => Value::BigInt(self.read_i64::<LE>().context(IoSnafu)?),
            5 => Value::BigUint(self.read_u64::<LE>().context(IoSnafu)?),
            6 => Value::String(self.read_string()?),
            7 => {
                let n = self.read_u16::<LE>().context(IoSnafu)?;
                Value::StringArray((0..n).map(|_| self.read_string()).collect::<Result<_>>()?)
            }
            8 => {
                let n = self.read_u16::<LE>().context(IoSnafu)?;
                Value::UintArray(
                    (0..n)
                        .map(|_| self.read_u32::<LE>().context(IoSnafu))
                        .collect::<Result<_>>()?,
                )
            }
            tag => return UnknownTagSnafu { tag }.fail(),
        })
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16::<LE>().context(IoSnafu)? as usize;
        let mut buf = vec![0; len];
        self.read_exact(&mut buf).context(IoSnafu)?;

        String::from_utf8(buf).context(Utf8EncodingSnafu)
    }
}

impl<T> ReadValue for Cursor<T> where T: AsRef<[u8]> {}

trait WriteValue: Write {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => return Ok(()),
            Value::Boolean(v) => self.write_u8(u8::from(*v)),
            Value::Int(v) => self.write_i32::<LE>(*v),
            Value::Uint(v) => self.write_u32::<LE>(*v),
            Value::BigInt(v) => self.write_i64::<LE>(*v),
            Value::BigUint(v) => self.write_u64::<LE>(*v),
            Value::String(s) => return self.write_string(s),
            Value::StringArray(items) => {
                self.write_len("string array", items.len())?;
                return items.iter().try_for_each(|s| self.write_string(s));
            }
            Value::UintArray(items) => {
                self.write_len("uint array", items.len())?;
                return items
                    .iter()
                    .try_for_each(|v| self.write_u32::<LE>(*v).context(IoSnafu));
            }
        }
        .context(IoSnafu)
    }

    fn write_len(&mut self, what: &'static str, len: usize) -> Result<()> {
        let len16 = u16::try_from(len).ok().context(TooLongSnafu { what, len })?;
        self.write_u16::<LE>(len16).context(IoSnafu)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_len("string", s.len())?;
        self.write_all(s.as_bytes()).context(IoSnafu)
    }
}

impl WriteValue for Vec<u8> {}
