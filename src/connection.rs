//! Connection lifecycle: one live transport plus the authentication
//! session bound to it.
//!
//! The session (an NTLM security context or a Kerberos message
//! encryptor) lives and dies with the connection. Closing the
//! connection clears both atomically, so a reconnect can never reuse
//! keys negotiated on a different socket.

use std::net::SocketAddr;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::auth::kerberos::KerberosEncryptor;
use crate::auth::ntlm::NtlmContext;
use crate::transport::Transport;

/// Channel-binding material derived from the TLS peer certificate,
/// mixed into NTLM authentication to tie it to the TLS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub cert_hash: [u8; 32],
}

impl ChannelBinding {
    /// Hash the peer certificate DER.
    pub fn from_cert_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let mut cert_hash = [0u8; 32];
        cert_hash.copy_from_slice(&digest);
        Self { cert_hash }
    }
}

/// Per-connection authentication state. Scheme-exclusive: a connection
/// carries at most one of the two contexts.
#[derive(Default)]
pub struct Session {
    ntlm: Option<Box<dyn NtlmContext>>,
    kerberos: Option<Box<dyn KerberosEncryptor>>,
}

impl Session {
    pub fn set_ntlm(&mut self, context: Box<dyn NtlmContext>) {
        self.kerberos = None;
        self.ntlm = Some(context);
    }

    pub fn set_kerberos(&mut self, encryptor: Box<dyn KerberosEncryptor>) {
        self.ntlm = None;
        self.kerberos = Some(encryptor);
    }

    pub fn ntlm_mut(&mut self) -> Option<&mut (dyn NtlmContext + '_)> {
        match &mut self.ntlm {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    pub fn kerberos_mut(&mut self) -> Option<&mut (dyn KerberosEncryptor + '_)> {
        match &mut self.kerberos {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    pub fn has_ntlm(&self) -> bool {
        self.ntlm.is_some()
    }

    pub fn has_kerberos(&self) -> bool {
        self.kerberos.is_some()
    }

    pub fn clear(&mut self) {
        self.ntlm = None;
        self.kerberos = None;
    }
}

/// A live connection to the target.
pub struct Conn {
    stream: Box<dyn Transport>,
    pub session: Session,
}

impl Conn {
    pub fn new(stream: Box<dyn Transport>) -> Self {
        Self {
            stream,
            session: Session::default(),
        }
    }

    /// Resolved peer address of the live stream.
    pub fn peerinfo(&self) -> Option<SocketAddr> {
        self.stream.peer_addr()
    }

    /// NTLM channel-binding token for the active TLS session, if any.
    pub fn channel_binding(&self) -> Option<ChannelBinding> {
        self.stream
            .peer_certificate()
            .map(|der| ChannelBinding::from_cert_der(&der))
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    pub async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).await
    }

    /// Orderly shutdown. The session is cleared with the connection.
    pub async fn shutdown(&mut self) {
        self.session.clear();
        let _ = self.stream.shutdown().await;
    }
}
