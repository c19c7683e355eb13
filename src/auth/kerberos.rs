//! Kerberos (GSS) authenticator interface.
//!
//! Ticket acquisition, sequence numbers and subkey derivation live in an
//! external GSS library. The client sends the initial token, hands the
//! server's mutual-auth blob back, and retains the resulting message
//! encryptor on the connection for per-request wrapping.

use bytes::Bytes;

use crate::error::Result;
use crate::response::Response;

/// Factory for per-handshake Kerberos authenticators.
pub trait KerberosProvider: Send + Sync {
    fn new_authenticator(&self) -> Box<dyn KerberosAuthenticator>;
}

/// One GSS exchange: initial token out, mutual-auth blob in.
pub trait KerberosAuthenticator: Send {
    /// Produce the initial GSS token for the `Authorization` header.
    fn initial_token(&mut self) -> Result<Vec<u8>>;

    /// Consume the server's mutual-auth blob, deriving the encryption
    /// subkey and sequence numbers for the session.
    fn process_mutual_auth(&mut self, token: &[u8]) -> Result<Box<dyn KerberosEncryptor>>;
}

/// Established Kerberos message protection, retained on the connection.
pub trait KerberosEncryptor: Send {
    /// Wrap an outbound request. Default: passthrough.
    fn transform_request(&mut self, request: Bytes) -> Bytes {
        request
    }

    /// Unwrap/verify an inbound response. Default: no-op.
    fn transform_response(&mut self, response: &mut Response) {
        let _ = response;
    }
}
