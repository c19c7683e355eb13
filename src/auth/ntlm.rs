//! NTLM / Negotiate provider interface and challenge plumbing.
//!
//! Type-1/2/3 message generation, signing and sealing belong to an
//! external NTLMSSP implementation; the client drives the handshake legs
//! and hands the provider the Type-2 challenge plus channel-binding
//! material from the live TLS session.

use bytes::Bytes;
use rand::Rng;

use crate::connection::ChannelBinding;
use crate::error::Result;
use crate::evasion::rand_alpha;
use crate::response::Response;

/// Factory for per-handshake NTLM security contexts.
pub trait NtlmProvider: Send + Sync {
    fn new_context(&self) -> Box<dyn NtlmContext>;
}

/// One NTLM handshake and, after it completes, the session keys that
/// sign or seal subsequent messages on the same connection.
pub trait NtlmContext: Send {
    /// Produce the Type-1 negotiate message.
    fn negotiate(&mut self, domain: &str, workstation: &str) -> Result<Vec<u8>>;

    /// Produce the Type-3 authenticate message for a Type-2 challenge,
    /// binding to the TLS channel when one is active.
    fn authenticate(
        &mut self,
        challenge: &[u8],
        binding: Option<&ChannelBinding>,
    ) -> Result<Vec<u8>>;

    /// Sign/seal an outbound request. Default: passthrough.
    fn transform_request(&mut self, request: Bytes) -> Bytes {
        request
    }

    /// Verify/unseal an inbound response. Default: no-op.
    fn transform_response(&mut self, response: &mut Response) {
        let _ = response;
    }
}

/// Random workstation name for the Type-1 message, 6 to 13 characters.
pub fn random_workstation(rng: &mut impl Rng) -> String {
    let len = rng.random_range(6..=13);
    rand_alpha(len, &mut *rng).to_uppercase()
}
