//! Pack/unpack tables for the IMC primitive wire types.
//!
//! Grounded in `original_source/src/pyimclsts/core.py`'s
//! `pack_functions_big`/`pack_functions_little`/`unpack_functions_big`/
//! `unpack_functions_little` dictionaries: one code path per primitive
//! type, dispatching on declared endianness rather than on the host's
//! native byte order.
//!
//! `message` and `message-list` fields are *not* handled here — they
//! recurse back into the schema catalog and are assembled by
//! [`crate::codec::frame`] and [`crate::message::Message::pack_fields`].

use crate::error::FrameError;
use crate::message::Value;
use crate::schema::PrimitiveKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

pub fn pack_u16(v: u16, endian: Endianness) -> [u8; 2] {
    match endian {
        Endianness::Big => v.to_be_bytes(),
        Endianness::Little => v.to_le_bytes(),
    }
}

pub fn read_u16(buf: &[u8], endian: Endianness) -> u16 {
    let arr = [buf[0], buf[1]];
    match endian {
        Endianness::Big => u16::from_be_bytes(arr),
        Endianness::Little => u16::from_le_bytes(arr),
    }
}

fn read_f64(buf: &[u8], endian: Endianness) -> f64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    match endian {
        Endianness::Big => f64::from_be_bytes(arr),
        Endianness::Little => f64::from_le_bytes(arr),
    }
}

fn pack_f64(v: f64, endian: Endianness) -> [u8; 8] {
    match endian {
        Endianness::Big => v.to_be_bytes(),
        Endianness::Little => v.to_le_bytes(),
    }
}

/// Maps a byte >= 0x80 into the Unicode Private Use Area so that
/// arbitrary `plaintext` bytes survive a round trip through a valid Rust
/// `String`. This is the Rust-safe analogue of Python's
/// `bytes.decode('ascii', 'surrogateescape')`, which cannot be represented
/// literally since Rust's `char` excludes surrogate code points.
fn decode_plaintext(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                char::from_u32(0xF780 + (b as u32 - 0x80)).expect("valid PUA codepoint")
            }
        })
        .collect()
}

fn encode_plaintext(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if cp < 0x80 {
                cp as u8
            } else if (0xF780..=0xF7FF).contains(&cp) {
                (cp - 0xF780 + 0x80) as u8
            } else {
                b'?'
            }
        })
        .collect()
}

pub fn pack(value: &Value, endian: Endianness) -> Vec<u8> {
    match value {
        Value::Int8(v) => vec![*v as u8],
        Value::UInt8(v) => vec![*v],
        Value::Int16(v) => match endian {
            Endianness::Big => v.to_be_bytes().to_vec(),
            Endianness::Little => v.to_le_bytes().to_vec(),
        },
        Value::UInt16(v) => pack_u16(*v, endian).to_vec(),
        Value::Int32(v) => match endian {
            Endianness::Big => v.to_be_bytes().to_vec(),
            Endianness::Little => v.to_le_bytes().to_vec(),
        },
        Value::UInt32(v) => match endian {
            Endianness::Big => v.to_be_bytes().to_vec(),
            Endianness::Little => v.to_le_bytes().to_vec(),
        },
        Value::Int64(v) => match endian {
            Endianness::Big => v.to_be_bytes().to_vec(),
            Endianness::Little => v.to_le_bytes().to_vec(),
        },
        Value::Fp32(v) => match endian {
            Endianness::Big => v.to_be_bytes().to_vec(),
            Endianness::Little => v.to_le_bytes().to_vec(),
        },
        Value::Fp64(v) => pack_f64(*v, endian).to_vec(),
        Value::RawData(bytes) => {
            let mut out = pack_u16(bytes.len() as u16, endian).to_vec();
            out.extend_from_slice(bytes);
            out
        }
        Value::PlainText(s) => {
            let bytes = encode_plaintext(s);
            let mut out = pack_u16(bytes.len() as u16, endian).to_vec();
            out.extend(bytes);
            out
        }
        Value::Message(_) | Value::MessageList(_) => {
            unreachable!("message/message-list fields are packed by Message::pack_fields")
        }
    }
}

/// Unpacks a single primitive value of `kind` from the front of `buf`,
/// returning the value and the number of bytes consumed.
pub fn unpack(kind: PrimitiveKind, buf: &[u8], endian: Endianness) -> Result<(Value, usize), FrameError> {
    let need = |n: usize| -> Result<(), FrameError> {
        if buf.len() < n {
            Err(FrameError::TooShort {
                expected: n,
                actual: buf.len(),
            })
        } else {
            Ok(())
        }
    };

    Ok(match kind {
        PrimitiveKind::Int8 => {
            need(1)?;
            (Value::Int8(buf[0] as i8), 1)
        }
        PrimitiveKind::UInt8 => {
            need(1)?;
            (Value::UInt8(buf[0]), 1)
        }
        PrimitiveKind::Int16 => {
            need(2)?;
            let mut arr = [0u8; 2];
            arr.copy_from_slice(&buf[..2]);
            let v = match endian {
                Endianness::Big => i16::from_be_bytes(arr),
                Endianness::Little => i16::from_le_bytes(arr),
            };
            (Value::Int16(v), 2)
        }
        PrimitiveKind::UInt16 => {
            need(2)?;
            (Value::UInt16(read_u16(buf, endian)), 2)
        }
        PrimitiveKind::Int32 => {
            need(4)?;
            let mut arr = [0u8; 4];
            arr.copy_from_slice(&buf[..4]);
            let v = match endian {
                Endianness::Big => i32::from_be_bytes(arr),
                Endianness::Little => i32::from_le_bytes(arr),
            };
            (Value::Int32(v), 4)
        }
        PrimitiveKind::UInt32 => {
            need(4)?;
            let mut arr = [0u8; 4];
            arr.copy_from_slice(&buf[..4]);
            let v = match endian {
                Endianness::Big => u32::from_be_bytes(arr),
                Endianness::Little => u32::from_le_bytes(arr),
            };
            (Value::UInt32(v), 4)
        }
        PrimitiveKind::Int64 => {
            need(8)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&buf[..8]);
            let v = match endian {
                Endianness::Big => i64::from_be_bytes(arr),
                Endianness::Little => i64::from_le_bytes(arr),
            };
            (Value::Int64(v), 8)
        }
        PrimitiveKind::Fp32 => {
            need(4)?;
            let mut arr = [0u8; 4];
            arr.copy_from_slice(&buf[..4]);
            let v = match endian {
                Endianness::Big => f32::from_be_bytes(arr),
                Endianness::Little => f32::from_le_bytes(arr),
            };
            (Value::Fp32(v), 4)
        }
        PrimitiveKind::Fp64 => {
            need(8)?;
            (Value::Fp64(read_f64(buf, endian)), 8)
        }
        PrimitiveKind::RawData => {
            need(2)?;
            let len = read_u16(buf, endian) as usize;
            need(2 + len)?;
            (Value::RawData(buf[2..2 + len].to_vec()), 2 + len)
        }
        PrimitiveKind::PlainText => {
            need(2)?;
            let len = read_u16(buf, endian) as usize;
            need(2 + len)?;
            (Value::PlainText(decode_plaintext(&buf[2..2 + len])), 2 + len)
        }
        PrimitiveKind::Message | PrimitiveKind::MessageList => {
            unreachable!("message/message-list fields are unpacked by codec::frame")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fp64_big_endian() {
        let v = Value::Fp64(1234.5678);
        let bytes = pack(&v, Endianness::Big);
        let (decoded, consumed) = unpack(PrimitiveKind::Fp64, &bytes, Endianness::Big).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, v);
    }

    #[test]
    fn round_trips_plaintext_with_high_bytes() {
        let raw = vec![b'h', b'i', 0xFF, 0x00, b'!'];
        let s = decode_plaintext(&raw);
        let back = encode_plaintext(&s);
        assert_eq!(raw, back);
    }

    #[test]
    fn rawdata_length_prefix_is_endian_sensitive() {
        let v = Value::RawData(vec![1, 2, 3]);
        let big = pack(&v, Endianness::Big);
        let little = pack(&v, Endianness::Little);
        assert_eq!(&big[0..2], &[0x00, 0x03]);
        assert_eq!(&little[0..2], &[0x03, 0x00]);
    }
}
