//! The authentication collaborator. NKEY/Ed25519 signing is out of scope;
//! this crate only needs the credential fields that go on the wire.

use async_trait::async_trait;

use crate::error::NatsResult;
use crate::protocol::AuthRecord;

/// Given the server's handshake nonce (empty when the server doesn't require
/// nonce-signing), produce whichever credential fields apply.
///
/// The signature, when present, is expected to be the base64 encoding of an
/// Ed25519 signature over the nonce bytes under the user's seed; computing
/// that signature is the implementor's responsibility.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, nonce: Option<&str>) -> NatsResult<AuthRecord>;
}

/// An authenticator for connections that carry no credentials at all.
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn authenticate(&self, _nonce: Option<&str>) -> NatsResult<AuthRecord> {
        Ok(AuthRecord::default())
    }
}

/// A fixed username/password pair, supplied up front.
pub struct UserPassAuth {
    pub user: String,
    pub pass: String,
}

#[async_trait]
impl Authenticator for UserPassAuth {
    async fn authenticate(&self, _nonce: Option<&str>) -> NatsResult<AuthRecord> {
        Ok(AuthRecord {
            user: Some(self.user.clone()),
            pass: Some(self.pass.clone()),
            ..Default::default()
        })
    }
}

/// A bearer token, supplied up front.
pub struct TokenAuth {
    pub token: String,
}

#[async_trait]
impl Authenticator for TokenAuth {
    async fn authenticate(&self, _nonce: Option<&str>) -> NatsResult<AuthRecord> {
        Ok(AuthRecord {
            auth_token: Some(self.token.clone()),
            ..Default::default()
        })
    }
}
