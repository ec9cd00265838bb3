//! Validation of user-entered endpoints and message text.
//!
//! Everything here runs before any network I/O.  A failure is reported to the
//! UI and changes no state.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// Input rejected locally, before any I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputValidationError {
    /// Address or port field left blank.
    #[error("please enter both an IP address and a port")]
    MissingEndpoint,
    /// The address is not a literal IPv4/IPv6 address.
    #[error("'{0}' is not a valid IP address")]
    InvalidAddress(String),
    /// The port is not a number in 1..=65535.
    #[error("'{0}' is not a valid port (expected 1-65535)")]
    InvalidPort(String),
    /// Message text was empty.
    #[error("please enter a message")]
    EmptyMessage,
}

/// Parses a user-entered IP address and port.
///
/// Host names are not resolved; only literal addresses are accepted.
///
/// # Errors
///
/// Returns the first [`InputValidationError`] that applies.
///
/// # Examples
///
/// ```rust
/// use chat_core::domain::parse_endpoint;
///
/// let addr = parse_endpoint("127.0.0.1", "9999").unwrap();
/// assert_eq!(addr.port(), 9999);
/// ```
pub fn parse_endpoint(address: &str, port: &str) -> Result<SocketAddr, InputValidationError> {
    let (address, port) = (address.trim(), port.trim());
    if address.is_empty() || port.is_empty() {
        return Err(InputValidationError::MissingEndpoint);
    }

    let ip: IpAddr = address
        .parse()
        .map_err(|_| InputValidationError::InvalidAddress(address.to_string()))?;

    let port: u16 = match port.parse() {
        Ok(p) if p != 0 => p,
        _ => return Err(InputValidationError::InvalidPort(port.to_string())),
    };

    Ok(SocketAddr::new(ip, port))
}

/// Rejects empty message text; returns it unchanged otherwise.
///
/// Whitespace-only text is allowed through, as it is still something the
/// user typed.
///
/// # Errors
///
/// Returns [`InputValidationError::EmptyMessage`] for `""`.
pub fn require_message_text(text: &str) -> Result<&str, InputValidationError> {
    if text.is_empty() {
        Err(InputValidationError::EmptyMessage)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_accepts_ipv4() {
        let addr = parse_endpoint("127.0.0.1", "9999").unwrap();
        assert_eq!(addr, "127.0.0.1:9999".parse().unwrap());
    }

    #[test]
    fn test_parse_endpoint_accepts_ipv6_and_trims() {
        let addr = parse_endpoint(" ::1 ", " 2000 ").unwrap();
        assert_eq!(addr, "[::1]:2000".parse().unwrap());
    }

    #[test]
    fn test_parse_endpoint_rejects_blank_fields() {
        assert_eq!(
            parse_endpoint("", "9999"),
            Err(InputValidationError::MissingEndpoint)
        );
        assert_eq!(
            parse_endpoint("127.0.0.1", "  "),
            Err(InputValidationError::MissingEndpoint)
        );
    }

    #[test]
    fn test_parse_endpoint_rejects_host_names() {
        assert_eq!(
            parse_endpoint("localhost", "9999"),
            Err(InputValidationError::InvalidAddress("localhost".to_string()))
        );
    }

    #[test]
    fn test_parse_endpoint_rejects_bad_ports() {
        for bad in ["abc", "0", "65536", "-1"] {
            assert_eq!(
                parse_endpoint("10.0.0.1", bad),
                Err(InputValidationError::InvalidPort(bad.to_string())),
                "port {bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_require_message_text_rejects_empty() {
        assert_eq!(
            require_message_text(""),
            Err(InputValidationError::EmptyMessage)
        );
        assert_eq!(require_message_text(" "), Ok(" "));
    }
}
