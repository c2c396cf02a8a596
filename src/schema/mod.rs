//! # Schema-Driven Catalog (C1/C2)
//!
//! Loads the IMC message schema (either from `IMC.xml` or from the
//! offline [`builtins`] catalog) into a [`Catalog`]: an id- and
//! abbrev-indexed table of [`MessageDescriptor`]s that the codec (C3/C4)
//! and the dynamic [`crate::message::Message`] representation validate
//! against at runtime.
//!
//! Per the Design Notes in the specification, message instances are not
//! code-generated per type (the real schema is an external resource with
//! hundreds of message definitions, unavailable to this crate at compile
//! time). Instead every message is a uniform tagged-value [`crate::message::Message`]
//! checked against the descriptor held here — this is option (b) from the
//! spec's open question on dynamic catalogs without dynamic typing.

pub mod builtins;
pub mod xml;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SchemaError;

/// The IMC primitive wire types, plus the two composite kinds (`message`,
/// `message-list`) that recurse into the catalog instead of the codec's
/// primitive tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Fp32,
    Fp64,
    RawData,
    PlainText,
    Message,
    MessageList,
}

impl PrimitiveKind {
    pub fn from_type_abbrev(s: &str) -> Option<Self> {
        Some(match s {
            "int8_t" => PrimitiveKind::Int8,
            "uint8_t" => PrimitiveKind::UInt8,
            "int16_t" => PrimitiveKind::Int16,
            "uint16_t" => PrimitiveKind::UInt16,
            "int32_t" => PrimitiveKind::Int32,
            "uint32_t" => PrimitiveKind::UInt32,
            "int64_t" | "uint64_t" => PrimitiveKind::Int64,
            "fp32_t" => PrimitiveKind::Fp32,
            "fp64_t" => PrimitiveKind::Fp64,
            "rawdata" => PrimitiveKind::RawData,
            "plaintext" => PrimitiveKind::PlainText,
            "message" => PrimitiveKind::Message,
            "message-list" => PrimitiveKind::MessageList,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Int8 => "int8_t",
            PrimitiveKind::UInt8 => "uint8_t",
            PrimitiveKind::Int16 => "int16_t",
            PrimitiveKind::UInt16 => "uint16_t",
            PrimitiveKind::Int32 => "int32_t",
            PrimitiveKind::UInt32 => "uint32_t",
            PrimitiveKind::Int64 => "int64_t",
            PrimitiveKind::Fp32 => "fp32_t",
            PrimitiveKind::Fp64 => "fp64_t",
            PrimitiveKind::RawData => "rawdata",
            PrimitiveKind::PlainText => "plaintext",
            PrimitiveKind::Message => "message",
            PrimitiveKind::MessageList => "message-list",
        }
    }
}

/// Whether a field carries a plain number or a symbolic enumeration/bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    None,
    Enumerated,
    Bitfield,
}

/// A named set of integer symbols: either an `enumerations` definition
/// (mutually exclusive values) or a `bitfields` definition (OR-combinable
/// flags, implicitly including `EMPTY = 0`).
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub prefix: String,
    pub is_bitfield: bool,
    /// Symbol -> value, in declaration order.
    pub symbols: IndexMap<String, i64>,
}

impl EnumDef {
    pub fn contains_value(&self, value: i64) -> bool {
        self.symbols.values().any(|&v| v == value)
    }

    /// Bitwise-OR of every declared flag; used to check that a bitfield
    /// value has no bits outside the known flag set.
    pub fn flag_mask(&self) -> i64 {
        self.symbols.values().fold(0, |acc, &v| acc | v)
    }
}

/// Turns a symbol that would be an invalid Rust/Python identifier (it
/// starts with a digit) into a valid one, mirroring `extract.py`'s
/// `x`-prefix rule for generated enum members.
pub fn sanitize_symbol(raw: &str) -> String {
    match raw.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("X{raw}"),
        _ => raw.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub abbrev: String,
    pub kind: PrimitiveKind,
    pub unit: Unit,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_def: Option<Arc<EnumDef>>,
    /// For `message`/`message-list` fields: restricts accepted embedded
    /// messages to this abbrev, if the schema declares one.
    pub message_type: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    pub id: u16,
    pub abbrev: String,
    pub name: String,
    pub category: String,
    pub description: String,
    /// Declaration order matters: it is also wire order.
    pub fields: IndexMap<String, FieldDescriptor>,
}

/// How a consumer narrows the full schema down to the messages it cares
/// about, mirroring `extract.py`'s whitelist/blacklist/minimal CLI modes.
#[derive(Debug, Clone)]
pub enum SelectionMode {
    Whitelist(HashSet<String>),
    Blacklist(HashSet<String>),
    Minimal,
    All,
}

/// The set of messages `pyimclsts.extract` always emits regardless of
/// selection mode, because the runtime's own built-in subscriptions
/// depend on them (peer discovery, entity queries, abort propagation).
pub const MINIMAL_SET: &[&str] = &[
    "Abort",
    "EntityState",
    "QueryEntityState",
    "EntityInfo",
    "QueryEntityInfo",
    "EntityList",
    "EntityActivationState",
    "QueryEntityActivationState",
    "Heartbeat",
    "Announce",
    "AnnounceService",
];

#[derive(Debug, Clone)]
pub struct Catalog {
    pub sync_word: u16,
    pub messages_by_id: HashMap<u16, Arc<MessageDescriptor>>,
    pub messages_by_abbrev: HashMap<String, Arc<MessageDescriptor>>,
    /// Category name -> message ids in that category, for `Selector::Category`.
    pub categories: IndexMap<String, Vec<u16>>,
    pub global_enums: HashMap<String, Arc<EnumDef>>,
    pub global_bitfields: HashMap<String, Arc<EnumDef>>,
}

impl Catalog {
    pub fn empty(sync_word: u16) -> Self {
        Catalog {
            sync_word,
            messages_by_id: HashMap::new(),
            messages_by_abbrev: HashMap::new(),
            categories: IndexMap::new(),
            global_enums: HashMap::new(),
            global_bitfields: HashMap::new(),
        }
    }

    pub fn insert(&mut self, descriptor: MessageDescriptor) {
        let descriptor = Arc::new(descriptor);
        self.categories
            .entry(descriptor.category.clone())
            .or_default()
            .push(descriptor.id);
        self.messages_by_abbrev
            .insert(descriptor.abbrev.clone(), descriptor.clone());
        self.messages_by_id.insert(descriptor.id, descriptor);
    }

    pub fn by_abbrev(&self, abbrev: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages_by_abbrev.get(abbrev)
    }

    pub fn by_id(&self, id: u16) -> Option<&Arc<MessageDescriptor>> {
        self.messages_by_id.get(&id)
    }

    /// Instantiates a blank (all-null) message for `abbrev`.
    pub fn instantiate(&self, abbrev: &str) -> Option<crate::message::Message> {
        self.by_abbrev(abbrev)
            .map(|d| crate::message::Message::new(d.clone()))
    }

    pub fn instantiate_id(&self, id: u16) -> Option<crate::message::Message> {
        self.by_id(id)
            .map(|d| crate::message::Message::new(d.clone()))
    }

    /// Applies a [`SelectionMode`] to this catalog, always keeping
    /// [`MINIMAL_SET`] regardless of mode, matching `extract.py`.
    pub fn select(&self, mode: &SelectionMode) -> Catalog {
        let keep = |abbrev: &str| -> bool {
            if MINIMAL_SET.contains(&abbrev) {
                return true;
            }
            match mode {
                SelectionMode::All | SelectionMode::Minimal => matches!(mode, SelectionMode::All),
                SelectionMode::Whitelist(set) => set.contains(abbrev),
                SelectionMode::Blacklist(set) => !set.contains(abbrev),
            }
        };

        let mut out = Catalog::empty(self.sync_word);
        out.global_enums = self.global_enums.clone();
        out.global_bitfields = self.global_bitfields.clone();
        for descriptor in self.messages_by_abbrev.values() {
            if keep(&descriptor.abbrev) {
                out.insert((**descriptor).clone());
            }
        }
        out
    }

    pub fn validate_schema(&self) -> Result<(), SchemaError> {
        for descriptor in self.messages_by_id.values() {
            for field in descriptor.fields.values() {
                if matches!(field.unit, Unit::Enumerated | Unit::Bitfield) && field.enum_def.is_none()
                {
                    return Err(SchemaError::UnknownEnumDef {
                        abbrev: descriptor.abbrev.clone(),
                        field: field.abbrev.clone(),
                        def_name: "<none>".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
