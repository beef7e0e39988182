//! Authentication for the deadline callback endpoint.
//!
//! The relay forwards `Authorization: Bearer <token>` with the shared secret
//! configured on both sides.

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct CallbackAuth {
    token: String,
}

impl CallbackAuth {
    /// # Errors
    ///
    /// `Unauthorized` when the token is empty; an empty secret would accept
    /// `Bearer ` with nothing after it.
    pub fn new(token: impl Into<String>) -> Result<Self, CoreError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CoreError::Unauthorized);
        }
        Ok(Self { token })
    }

    /// Check an `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> Result<(), CoreError> {
        let header = header.ok_or(CoreError::Unauthorized)?.trim();
        let (scheme, credential) = header.split_once(' ').ok_or(CoreError::Unauthorized)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(CoreError::Unauthorized);
        }
        if constant_time_eq(credential.trim().as_bytes(), self.token.as_bytes()) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_with_shared_token() {
        let auth = CallbackAuth::new("s3cret").unwrap();
        assert!(auth.verify(Some("Bearer s3cret")).is_ok());
        assert!(auth.verify(Some("bearer s3cret")).is_ok());
    }

    #[test]
    fn rejects_everything_else() {
        let auth = CallbackAuth::new("s3cret").unwrap();
        for header in [None, Some(""), Some("s3cret"), Some("Basic s3cret"), Some("Bearer nope"), Some("Bearer s3cre")] {
            assert!(
                matches!(auth.verify(header), Err(CoreError::Unauthorized)),
                "{header:?}"
            );
        }
    }

    #[test]
    fn empty_token_is_refused() {
        assert!(CallbackAuth::new("  ").is_err());
    }
}
