//! Plan-time validation of attribute values.
//!
//! Every value that is embedded in dynamically built SQL must pass one of
//! these validators before any statement is rendered.

mod error;
mod identifier;
mod object;
mod password;

pub use error::{Limit, ValidationError};
pub use identifier::{
    validate_credential_identity, validate_sql_identifier, MAX_IDENTIFIER_LENGTH,
    SHARED_ACCESS_SIGNATURE,
};
pub use object::{validate_one_of, validate_permission, validate_sid, validate_verify_object};
pub use password::{validate_password, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
