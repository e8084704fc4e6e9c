//! Record model and integrity helpers shared by the keeper server and client.

pub mod checksum;
pub mod errors;
pub mod types;

pub use checksum::{fingerprint, verify};
pub use errors::{Error, Result};
pub use types::{
    Credentials, DataRecord, DataType, ErrorResponse, FIELD_DELIMITER, RecordRequest,
    TokenResponse, User, has_subfields,
};
