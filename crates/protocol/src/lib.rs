//! Wire vocabulary for resumable uploads.
//!
//! Everything here is pure: header sets, status interpretation, metadata
//! encoding and `Location` resolution. The state machine that uses them
//! lives in `resumable-upload`.

pub mod constants;
pub mod dialect;
pub mod location;
pub mod metadata;
pub mod status;

pub use dialect::{
    Dialect, HeaderPair, final_concat_header, parse_length, parse_sf_bool, partial_concat_header,
};
pub use location::resolve_location;
pub use metadata::{decode_metadata, encode_metadata, validate_metadata_key};
pub use status::{StatusClass, in_category};

/// Errors produced while encoding or decoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown protocol dialect: {0}")]
    UnknownDialect(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}
