//! Frame assembly and parsing (C4): header encode/decode, CRC footer,
//! endianness detection from the sync word, and the `Unknown` envelope
//! for messages whose id is absent from the catalog.
//!
//! Grounded in `original_source/src/pyimclsts/_base.py::base_message.pack`
//! (header defaulting rules) and `network.py::unpack` (recursive decode,
//! `is_field_message`/`fast_mode`, `Unknown` fallback).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::crc::crc16_ibm;
use crate::codec::primitive::{self, read_u16, Endianness};
use crate::error::{FrameError, ImcError, ValidationError};
use crate::hostaddr::default_src;
use crate::message::{Header, Message, Value, FOOTER_LEN, HEADER_LEN};
use crate::schema::{Catalog, MessageDescriptor, PrimitiveKind};

/// Overrides applied to the header when packing. Any field left `None`
/// reuses the message's previous header if it has one, or the documented
/// defaults (`src` from [`default_src`], `src_ent = 0xFF`, `dst =
/// 0xFFFF`, `dst_ent = 0xFF`) if it does not.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub src: Option<u16>,
    pub src_ent: Option<u8>,
    pub dst: Option<u16>,
    pub dst_ent: Option<u8>,
}

fn now_unix_seconds_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn build_header(sync_word: u16, msg: &Message, size: u16, opts: &EncodeOptions) -> Header {
    match &msg.header {
        Some(prev) => Header {
            sync: sync_word,
            mgid: msg.id(),
            size,
            timestamp: prev.timestamp,
            src: opts.src.unwrap_or(prev.src),
            src_ent: opts.src_ent.unwrap_or(prev.src_ent),
            dst: opts.dst.unwrap_or(prev.dst),
            dst_ent: opts.dst_ent.unwrap_or(prev.dst_ent),
        },
        None => Header {
            sync: sync_word,
            mgid: msg.id(),
            size,
            timestamp: now_unix_seconds_f64(),
            src: opts.src.unwrap_or_else(default_src),
            src_ent: opts.src_ent.unwrap_or(0xFF),
            dst: opts.dst.unwrap_or(0xFFFF),
            dst_ent: opts.dst_ent.unwrap_or(0xFF),
        },
    }
}

pub fn encode_header(h: &Header, endian: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&primitive::pack_u16(h.sync, endian));
    out.extend_from_slice(&primitive::pack_u16(h.mgid, endian));
    out.extend_from_slice(&primitive::pack_u16(h.size, endian));
    out.extend(match endian {
        Endianness::Big => h.timestamp.to_be_bytes(),
        Endianness::Little => h.timestamp.to_le_bytes(),
    });
    out.extend_from_slice(&primitive::pack_u16(h.src, endian));
    out.push(h.src_ent);
    out.extend_from_slice(&primitive::pack_u16(h.dst, endian));
    out.push(h.dst_ent);
    out
}

pub fn decode_header(buf: &[u8], endian: Endianness) -> Header {
    let timestamp = {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&buf[6..14]);
        match endian {
            Endianness::Big => f64::from_be_bytes(arr),
            Endianness::Little => f64::from_le_bytes(arr),
        }
    };
    Header {
        sync: read_u16(&buf[0..2], endian),
        mgid: read_u16(&buf[2..4], endian),
        size: read_u16(&buf[4..6], endian),
        timestamp,
        src: read_u16(&buf[14..16], endian),
        src_ent: buf[16],
        dst: read_u16(&buf[17..19], endian),
        dst_ent: buf[19],
    }
}

/// A frame whose `mgid` is not present in the catalog. The original bytes
/// and the detected endianness are preserved so the frame can be
/// re-emitted byte-for-byte.
#[derive(Debug, Clone)]
pub struct UnknownMessage {
    pub mgid: u16,
    pub contents: Vec<u8>,
    pub endianness: Endianness,
    pub header: Header,
}

impl UnknownMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = encode_header(&self.header, self.endianness);
        out.extend_from_slice(&self.contents);
        let crc = crc16_ibm(&out);
        out.extend_from_slice(&primitive::pack_u16(crc, self.endianness));
        out
    }
}

pub enum Decoded {
    Known(Message),
    Unknown(UnknownMessage),
}

/// Encodes `msg` as a complete wire frame: header, fields, CRC footer.
/// Updates `msg.header`/`msg.footer` in place, matching
/// `base_message.pack`'s behavior of caching the header it computed.
pub fn encode(
    catalog: &Catalog,
    msg: &mut Message,
    endian: Endianness,
    opts: EncodeOptions,
) -> Result<Vec<u8>, ValidationError> {
    let fields_bytes = msg.pack_fields(endian)?;
    let header = build_header(catalog.sync_word, msg, fields_bytes.len() as u16, &opts);

    let mut out = Vec::with_capacity(HEADER_LEN + fields_bytes.len() + FOOTER_LEN);
    out.extend(encode_header(&header, endian));
    out.extend(fields_bytes);
    let crc = crc16_ibm(&out);
    out.extend_from_slice(&primitive::pack_u16(crc, endian));

    msg.header = Some(header);
    msg.footer = Some(crc);
    Ok(out)
}

/// Detects whether `buf` starts with the catalog's sync word in
/// big-endian or little-endian form.
pub fn detect_endianness(sync_word: u16, buf: &[u8]) -> Result<Endianness, FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::TooShort {
            expected: 2,
            actual: buf.len(),
        });
    }
    if u16::from_be_bytes([buf[0], buf[1]]) == sync_word {
        Ok(Endianness::Big)
    } else if u16::from_le_bytes([buf[0], buf[1]]) == sync_word {
        Ok(Endianness::Little)
    } else {
        Err(FrameError::BadSync)
    }
}

/// Peeks `(mgid, src, src_ent)` out of a raw frame without a full decode,
/// used by the dispatcher to decide whether any subscription cares about
/// this frame before paying for a full decode. Grounded in
/// `network.py::_get_id_src_src_ent`.
pub fn peek_ids(buf: &[u8], sync_word: u16) -> Option<(u16, u16, u8)> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let endian = detect_endianness(sync_word, buf).ok()?;
    Some((
        read_u16(&buf[2..4], endian),
        read_u16(&buf[14..16], endian),
        buf[16],
    ))
}

/// Decodes one complete frame (header + fields + CRC) from `buf`.
///
/// `fast_mode` skips the `Message::set` validation path and writes
/// fields directly, matching the specification's fast-mode guarantee:
/// CRC and framing are always validated, but per-field range/enum checks
/// are skipped.
///
/// Unlike the message bus's reader loop (which catches `FrameError`
/// internally and resynchronizes, per spec §4.6), this function surfaces
/// `FrameError` directly — it is meant for direct/offline use (tests,
/// capture-file analysis).
pub fn decode(catalog: &Catalog, buf: &[u8], fast_mode: bool) -> Result<Decoded, ImcError> {
    let endian = detect_endianness(catalog.sync_word, buf)?;
    if buf.len() < HEADER_LEN {
        return Err(FrameError::TooShort {
            expected: HEADER_LEN,
            actual: buf.len(),
        }
        .into());
    }
    let header = decode_header(&buf[0..HEADER_LEN], endian);
    let size = header.size as usize;
    let total = HEADER_LEN + size + FOOTER_LEN;
    if buf.len() < total {
        return Err(FrameError::TooShort {
            expected: total,
            actual: buf.len(),
        }
        .into());
    }

    let computed = crc16_ibm(&buf[0..HEADER_LEN + size]);
    let found = read_u16(&buf[HEADER_LEN + size..total], endian);
    if computed != found {
        return Err(FrameError::CrcMismatch { computed, found }.into());
    }

    let payload = &buf[HEADER_LEN..HEADER_LEN + size];
    match catalog.by_id(header.mgid) {
        Some(descriptor) => {
            let (mut msg, _) = decode_body(catalog, descriptor.clone(), payload, endian, fast_mode)?;
            msg.header = Some(header);
            Ok(Decoded::Known(msg))
        }
        None => Ok(Decoded::Unknown(UnknownMessage {
            mgid: header.mgid,
            contents: payload.to_vec(),
            endianness: endian,
            header,
        })),
    }
}

/// Decodes just the field portion of a message (no header/CRC), used
/// both for the top-level frame and recursively for embedded
/// `message`/`message-list` fields. Returns the message and the number
/// of bytes consumed from `buf`.
fn decode_body(
    catalog: &Catalog,
    descriptor: Arc<MessageDescriptor>,
    buf: &[u8],
    endian: Endianness,
    fast_mode: bool,
) -> Result<(Message, usize), ImcError> {
    let mut cursor = 0usize;
    let mut msg = Message::new(descriptor.clone());

    for (name, fd) in descriptor.fields.iter() {
        match fd.kind {
            PrimitiveKind::Message => {
                if buf.len() < cursor + 2 {
                    return Err(FrameError::TooShort {
                        expected: cursor + 2,
                        actual: buf.len(),
                    }
                    .into());
                }
                let id = read_u16(&buf[cursor..cursor + 2], endian);
                if id == 0xFFFF {
                    cursor += 2;
                    assign(&mut msg, name, Value::Message(None), fast_mode)?;
                } else {
                    let inner_desc = catalog
                        .by_id(id)
                        .ok_or(FrameError::UnknownEmbeddedId(id))?
                        .clone();
                    let (inner, consumed) =
                        decode_body(catalog, inner_desc, &buf[cursor + 2..], endian, fast_mode)?;
                    cursor += 2 + consumed;
                    assign(&mut msg, name, Value::Message(Some(Box::new(inner))), fast_mode)?;
                }
            }
            PrimitiveKind::MessageList => {
                if buf.len() < cursor + 2 {
                    return Err(FrameError::TooShort {
                        expected: cursor + 2,
                        actual: buf.len(),
                    }
                    .into());
                }
                let count = read_u16(&buf[cursor..cursor + 2], endian);
                cursor += 2;
                let mut list = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    if buf.len() < cursor + 2 {
                        return Err(FrameError::TooShort {
                            expected: cursor + 2,
                            actual: buf.len(),
                        }
                        .into());
                    }
                    let id = read_u16(&buf[cursor..cursor + 2], endian);
                    let inner_desc = catalog
                        .by_id(id)
                        .ok_or(FrameError::UnknownEmbeddedId(id))?
                        .clone();
                    let (inner, consumed) =
                        decode_body(catalog, inner_desc, &buf[cursor + 2..], endian, fast_mode)?;
                    cursor += 2 + consumed;
                    list.push(inner);
                }
                assign(&mut msg, name, Value::MessageList(list), fast_mode)?;
            }
            _ => {
                let (value, consumed) = primitive::unpack(fd.kind, &buf[cursor..], endian)?;
                cursor += consumed;
                assign(&mut msg, name, value, fast_mode)?;
            }
        }
    }

    Ok((msg, cursor))
}

fn assign(msg: &mut Message, field: &str, value: Value, fast_mode: bool) -> Result<(), ValidationError> {
    if fast_mode {
        msg.set_raw(field, value);
        Ok(())
    } else {
        msg.set(field, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtins;

    #[test]
    fn heartbeat_round_trips() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let bytes = encode(&catalog, &mut msg, Endianness::Big, EncodeOptions::default()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + FOOTER_LEN);
        match decode(&catalog, &bytes, false).unwrap() {
            Decoded::Known(decoded) => assert_eq!(decoded.abbrev(), "Heartbeat"),
            Decoded::Unknown(_) => panic!("expected known message"),
        }
    }

    #[test]
    fn bad_crc_is_rejected() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let mut bytes = encode(&catalog, &mut msg, Endianness::Big, EncodeOptions::default()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode(&catalog, &bytes, false),
            Err(ImcError::Frame(FrameError::CrcMismatch { .. }))
        ));
    }

    #[test]
    fn unknown_message_id_round_trips_bytes() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let mut bytes = encode(&catalog, &mut msg, Endianness::Big, EncodeOptions::default()).unwrap();
        // Rewrite the mgid to something absent from the catalog, then fix up the CRC.
        bytes[2] = 0xFF;
        bytes[3] = 0xFE;
        let crc_start = bytes.len() - FOOTER_LEN;
        let crc = crc16_ibm(&bytes[..crc_start]);
        bytes[crc_start..].copy_from_slice(&primitive::pack_u16(crc, Endianness::Big));

        match decode(&catalog, &bytes, false).unwrap() {
            Decoded::Unknown(u) => {
                assert_eq!(u.mgid, 0xFFFE);
                assert_eq!(u.encode(), bytes);
            }
            Decoded::Known(_) => panic!("expected unknown message"),
        }
    }

    #[test]
    fn little_endian_sync_is_detected() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let bytes = encode(&catalog, &mut msg, Endianness::Little, EncodeOptions::default()).unwrap();
        assert_eq!(
            detect_endianness(catalog.sync_word, &bytes).unwrap(),
            Endianness::Little
        );
    }
}
