//! Wire codec (C3/C4): primitive pack/unpack tables, the CRC-16/IBM
//! footer, and frame assembly/parsing including the `Unknown` envelope.

pub mod crc;
pub mod frame;
pub mod primitive;

pub use crc::crc16_ibm;
pub use frame::{decode, decode_header, detect_endianness, encode, encode_header, peek_ids, Decoded, EncodeOptions, UnknownMessage};
pub use primitive::Endianness;
