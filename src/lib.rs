//! # wraith
//!
//! HTTP/1.x client engineered for offensive security and protocol
//! testing. It speaks RFC 2616 HTTP the way servers expect, and also
//! permits deliberate, parameterized deviations (encoding tricks,
//! request-line padding, header folding, fake parameters) for
//! fingerprinting servers and evading naive inspection.
//!
//! The client drives a complete challenge-response authentication
//! exchange across Basic, Digest, NTLM and Negotiate/Kerberos,
//! including body deferral so large payloads are not re-sent during
//! multi-leg handshakes.
//!
//! ```rust,ignore
//! use wraith::{Client, Request, RequestSpec, Wait};
//!
//! let mut client = Client::new("192.0.2.10", 8080);
//! client.set_option("username", "operator")?;
//! client.set_option("password", "hunter2")?;
//! client.set_option("uri_encode_mode", "hex-random")?;
//!
//! let req = RequestSpec::cgi("GET", "/admin").get_var("action", "status");
//! let res = client
//!     .send_recv(Request::Structured(req), Wait::from_secs(10), false)
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod evasion;
pub mod request;
pub mod response;
pub mod transport;

pub use auth::kerberos::{KerberosAuthenticator, KerberosEncryptor, KerberosProvider};
pub use auth::ntlm::{NtlmContext, NtlmProvider};
pub use auth::AuthScheme;
pub use client::{Client, Observer, ReadOutcome};
pub use config::ClientConfig;
pub use connection::{ChannelBinding, Conn, Session};
pub use error::{Error, Result};
pub use evasion::{PadType, UriEncodeMode};
pub use request::{FormPart, ParamValue, Request, RequestSpec};
pub use response::{BodyError, Headers, ParseCode, ParseState, Response};
pub use transport::{SocketFactory, SocketParams, TcpFactory, Transport, Wait};
