//! # Error Taxonomy
//!
//! Mirrors the error kinds laid out in the specification: schema errors are
//! fatal at generation/load time, validation errors are surfaced to the
//! caller of a setter or of `pack`, frame errors are handled internally by
//! the framer (resynchronization) and never escape the message bus, and
//! transport errors signal end-of-stream or connection loss.

use thiserror::Error;

/// Failure while loading or interpreting the IMC schema (C1).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse IMC schema XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("schema file not found at {0}; fetching it from a remote repository is out of scope for this runtime")]
    NotFound(std::path::PathBuf),

    #[error("unknown primitive IMC type `{0}` referenced by schema")]
    UnknownPrimitive(String),

    #[error("message `{abbrev}` field `{field}` references undefined enumeration/bitfield `{def_name}`")]
    UnknownEnumDef {
        abbrev: String,
        field: String,
        def_name: String,
    },

    #[error("malformed schema: {0}")]
    Malformed(String),
}

/// Failure validating a field assignment or a pack operation (C2/C4).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("message `{abbrev}` has no field named `{field}`")]
    UnknownField { abbrev: String, field: String },

    #[error("field `{field}` of message `{abbrev}` expects type {expected}, got {actual}")]
    WrongType {
        abbrev: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field `{field}` of message `{abbrev}`: value {value} is below the minimum {min}")]
    BelowMin {
        abbrev: String,
        field: String,
        value: f64,
        min: f64,
    },

    #[error("field `{field}` of message `{abbrev}`: value {value} is above the maximum {max}")]
    AboveMax {
        abbrev: String,
        field: String,
        value: f64,
        max: f64,
    },

    #[error("field `{field}` of message `{abbrev}`: {value} is not a member of enumeration `{enum_name}`")]
    NotInEnum {
        abbrev: String,
        field: String,
        value: i64,
        enum_name: String,
    },

    #[error("field `{field}` of message `{abbrev}`: bits {value:#x} are not all recognized flags of bitfield `{bitfield_name}`")]
    NotInBitfield {
        abbrev: String,
        field: String,
        value: i64,
        bitfield_name: String,
    },

    #[error("message-list field `{field}` of message `{abbrev}` expects elements of type `{expected}`, got `{actual}`")]
    WrongListElement {
        abbrev: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("cannot pack message `{abbrev}`: field `{field}` is null and is not of type `message`")]
    NullField { abbrev: String, field: String },
}

/// Failure assembling or parsing a single wire frame (C4).
///
/// Surfaced only when the codec is used directly (tests, offline capture
/// analysis). The message bus's reader loop never surfaces these: it
/// catches them internally and resynchronizes (spec §4.6).
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid sync word: frame does not start with the expected sync bytes in either endianness")]
    BadSync,

    #[error("CRC mismatch: computed {computed:#06x}, frame contains {found:#06x}")]
    CrcMismatch { computed: u16, found: u16 },

    #[error("embedded message references unknown message id {0}; add it to the catalog")]
    UnknownEmbeddedId(u16),
}

/// Failure at the byte-transport layer (C5).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("end of stream reached")]
    Eof,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure propagated from a user subscription callback (C7).
///
/// Per spec §7, the dispatcher does not catch these; they are expected to
/// be handled by callers of `Dispatcher::run`.
#[derive(Debug, Error)]
#[error("subscriber callback failed: {0}")]
pub struct DispatchError(#[from] pub anyhow::Error);

/// Umbrella error type returned by the crate's public fallible operations.
#[derive(Debug, Error)]
pub enum ImcError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type Result<T, E = ImcError> = std::result::Result<T, E>;
