//! Pure domain rules with no I/O: endpoint validation and input checks.

pub mod endpoint;

pub use endpoint::{parse_endpoint, require_message_text, InputValidationError};
