//! Client/server DTOs exchanged during the handshake and the small
//! argument-validation helpers shared by the outbound command builders.

mod connect;
pub use self::connect::*;

/// NATS subjects, queue groups and reply subjects may not contain whitespace;
/// the wire format is space-delimited and a stray space or tab would desync
/// the parser on the other end.
pub fn validate_token(value: &str, what: &str) -> Result<(), crate::error::NatsError> {
    if value.is_empty() {
        return Err(crate::error::NatsError::ProtocolError(format!("{what} must not be empty")));
    }
    if value.contains(' ') || value.contains('\t') {
        return Err(crate::error::NatsError::ProtocolError(format!(
            "{what} must not contain whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_whitespace_tokens() {
        assert!(validate_token("a.b", "subject").is_ok());
        assert!(validate_token("a b", "subject").is_err());
        assert!(validate_token("a\tb", "subject").is_err());
        assert!(validate_token("", "subject").is_err());
    }
}
