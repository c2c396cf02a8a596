//! The dynamic message representation: a [`Message`] is a tagged-value
//! record validated against a [`MessageDescriptor`] from the schema
//! catalog, rather than a per-message generated struct (see
//! `schema` module docs for why).
//!
//! Grounded in `original_source/src/pyimclsts/_base.py`'s `base_message`
//! and its `immutable_attr`/`mutable_attr` validating descriptors: field
//! assignment validates type/range/enum membership at the point of
//! `set`, and `header`/`footer` behave the same way `_header`/`_footer`
//! do there (absent until the message is packed once, then reused and
//! only the timestamp is preserved across re-packs).

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ValidationError;
use crate::schema::{MessageDescriptor, PrimitiveKind, Unit};

/// A single field value. Variants line up 1:1 with [`PrimitiveKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Fp32(f32),
    Fp64(f64),
    RawData(Vec<u8>),
    PlainText(String),
    Message(Option<Box<Message>>),
    MessageList(Vec<Message>),
}

impl Value {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Value::Int8(_) => PrimitiveKind::Int8,
            Value::UInt8(_) => PrimitiveKind::UInt8,
            Value::Int16(_) => PrimitiveKind::Int16,
            Value::UInt16(_) => PrimitiveKind::UInt16,
            Value::Int32(_) => PrimitiveKind::Int32,
            Value::UInt32(_) => PrimitiveKind::UInt32,
            Value::Int64(_) => PrimitiveKind::Int64,
            Value::Fp32(_) => PrimitiveKind::Fp32,
            Value::Fp64(_) => PrimitiveKind::Fp64,
            Value::RawData(_) => PrimitiveKind::RawData,
            Value::PlainText(_) => PrimitiveKind::PlainText,
            Value::Message(_) => PrimitiveKind::Message,
            Value::MessageList(_) => PrimitiveKind::MessageList,
        }
    }

    /// Numeric value as `f64`, for range/enum checks. `None` for
    /// non-numeric kinds.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int8(v) => Some(v as f64),
            Value::UInt8(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::Int64(v) => Some(v as f64),
            Value::Fp32(v) => Some(v as f64),
            Value::Fp64(v) => Some(v),
            _ => None,
        }
    }

    /// Integer value, for enum/bitfield membership checks.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::UInt8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }
}

/// The fixed 20-byte IMC header, laid out `sync, mgid, size, timestamp,
/// src, src_ent, dst, dst_ent` per the specification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub sync: u16,
    pub mgid: u16,
    pub size: u16,
    pub timestamp: f64,
    pub src: u16,
    pub src_ent: u8,
    pub dst: u16,
    pub dst_ent: u8,
}

pub const HEADER_LEN: usize = 20;
pub const FOOTER_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct Message {
    pub descriptor: Arc<MessageDescriptor>,
    fields: IndexMap<String, Option<Value>>,
    pub header: Option<Header>,
    pub footer: Option<u16>,
}

/// Mirrors `base_message.__eq__`: the footer/CRC never participates,
/// and the header is only compared when both sides have one (an
/// embedded message has none, and that should not make it unequal to
/// itself).
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        if self.descriptor.id != other.descriptor.id {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.header, &other.header) {
            if a != b {
                return false;
            }
        }
        self.fields == other.fields
    }
}

impl Message {
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        let fields = descriptor.fields.keys().map(|k| (k.clone(), None)).collect();
        Message {
            descriptor,
            fields,
            header: None,
            footer: None,
        }
    }

    pub fn abbrev(&self) -> &str {
        &self.descriptor.abbrev
    }

    pub fn id(&self) -> u16 {
        self.descriptor.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(|v| v.as_ref())
    }

    /// Validated setter: checks type, range, and enum/bitfield/message-type
    /// constraints before storing the value.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), ValidationError> {
        let fd = self
            .descriptor
            .fields
            .get(field)
            .ok_or_else(|| ValidationError::UnknownField {
                abbrev: self.descriptor.abbrev.clone(),
                field: field.to_string(),
            })?
            .clone();
        self.validate(&fd, &value)?;
        self.fields.insert(field.to_string(), Some(value));
        Ok(())
    }

    /// Bypasses validation. Used internally by the codec's fast-mode
    /// decode path (spec §4.4).
    pub fn set_raw(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), Some(value));
    }

    fn validate(
        &self,
        fd: &crate::schema::FieldDescriptor,
        value: &Value,
    ) -> Result<(), ValidationError> {
        let abbrev = &self.descriptor.abbrev;

        let same_family = matches!(
            (fd.kind, value.kind()),
            (PrimitiveKind::Message, PrimitiveKind::Message)
                | (PrimitiveKind::MessageList, PrimitiveKind::MessageList)
                | (PrimitiveKind::RawData, PrimitiveKind::RawData)
                | (PrimitiveKind::PlainText, PrimitiveKind::PlainText)
        );
        let numeric_ok = value.as_f64().is_some()
            && matches!(
                fd.kind,
                PrimitiveKind::Int8
                    | PrimitiveKind::UInt8
                    | PrimitiveKind::Int16
                    | PrimitiveKind::UInt16
                    | PrimitiveKind::Int32
                    | PrimitiveKind::UInt32
                    | PrimitiveKind::Int64
                    | PrimitiveKind::Fp32
                    | PrimitiveKind::Fp64
            );
        if !same_family && !numeric_ok {
            return Err(ValidationError::WrongType {
                abbrev: abbrev.clone(),
                field: fd.abbrev.clone(),
                expected: fd.kind.name(),
                actual: value.kind().name(),
            });
        }

        if let Some(num) = value.as_f64() {
            if let Some(min) = fd.min {
                if num < min {
                    return Err(ValidationError::BelowMin {
                        abbrev: abbrev.clone(),
                        field: fd.abbrev.clone(),
                        value: num,
                        min,
                    });
                }
            }
            if let Some(max) = fd.max {
                if num > max {
                    return Err(ValidationError::AboveMax {
                        abbrev: abbrev.clone(),
                        field: fd.abbrev.clone(),
                        value: num,
                        max,
                    });
                }
            }
        }

        if let (Unit::Enumerated, Some(iv)) = (fd.unit, value.as_i64()) {
            if let Some(def) = &fd.enum_def {
                if !def.contains_value(iv) {
                    return Err(ValidationError::NotInEnum {
                        abbrev: abbrev.clone(),
                        field: fd.abbrev.clone(),
                        value: iv,
                        enum_name: def.name.clone(),
                    });
                }
            }
        }
        if let (Unit::Bitfield, Some(iv)) = (fd.unit, value.as_i64()) {
            if let Some(def) = &fd.enum_def {
                if iv & !def.flag_mask() != 0 {
                    return Err(ValidationError::NotInBitfield {
                        abbrev: abbrev.clone(),
                        field: fd.abbrev.clone(),
                        value: iv,
                        bitfield_name: def.name.clone(),
                    });
                }
            }
        }

        if fd.kind == PrimitiveKind::Message {
            if let (Value::Message(Some(inner)), Some(expected)) = (value, &fd.message_type) {
                if inner.abbrev() != expected {
                    return Err(ValidationError::WrongListElement {
                        abbrev: abbrev.clone(),
                        field: fd.abbrev.clone(),
                        expected: expected.clone(),
                        actual: inner.abbrev().to_string(),
                    });
                }
            }
        }
        if fd.kind == PrimitiveKind::MessageList {
            if let (Value::MessageList(list), Some(expected)) = (value, &fd.message_type) {
                for m in list {
                    if m.abbrev() != expected {
                        return Err(ValidationError::WrongListElement {
                            abbrev: abbrev.clone(),
                            field: fd.abbrev.clone(),
                            expected: expected.clone(),
                            actual: m.abbrev().to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Packs this message's fields only (no header/CRC), in descriptor
    /// field order. Used both as the top-level body by
    /// [`crate::codec::frame::encode`] and recursively for embedded
    /// `message`/`message-list` fields.
    pub fn pack_fields(&self, endian: crate::codec::Endianness) -> Result<Vec<u8>, ValidationError> {
        let mut out = Vec::new();
        for (name, fd) in &self.descriptor.fields {
            let value = self.fields.get(name).and_then(|v| v.as_ref());
            match (fd.kind, value) {
                (PrimitiveKind::Message, None) | (PrimitiveKind::Message, Some(Value::Message(None))) => {
                    out.extend_from_slice(&crate::codec::primitive::pack_u16(0xFFFF, endian));
                }
                (PrimitiveKind::Message, Some(Value::Message(Some(inner)))) => {
                    out.extend_from_slice(&crate::codec::primitive::pack_u16(inner.id(), endian));
                    out.extend(inner.pack_fields(endian)?);
                }
                (PrimitiveKind::MessageList, Some(Value::MessageList(list))) => {
                    out.extend_from_slice(&crate::codec::primitive::pack_u16(list.len() as u16, endian));
                    for m in list {
                        out.extend_from_slice(&crate::codec::primitive::pack_u16(m.id(), endian));
                        out.extend(m.pack_fields(endian)?);
                    }
                }
                (PrimitiveKind::MessageList, None) => {
                    out.extend_from_slice(&crate::codec::primitive::pack_u16(0, endian));
                }
                (_, Some(v)) => out.extend(crate::codec::primitive::pack(v, endian)),
                (_, None) => {
                    return Err(ValidationError::NullField {
                        abbrev: self.descriptor.abbrev.clone(),
                        field: name.clone(),
                    })
                }
            }
        }
        Ok(out)
    }
}
