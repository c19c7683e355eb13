//! Challenge-response authentication: scheme detection and the
//! per-scheme building blocks the client drives.
//!
//! The cryptographic providers for NTLM and Kerberos are external
//! collaborators; only their interfaces live here. Basic and Digest are
//! computed in-crate.

pub mod basic;
pub mod digest;
pub mod kerberos;
pub mod ntlm;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Authentication scheme carried by a `WWW-Authenticate` challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Basic,
    Digest,
    Ntlm,
    Negotiate,
    Kerberos,
}

impl AuthScheme {
    /// Challenge/config spellings, in selection-priority order.
    pub const CHOICES: &'static [&'static str] =
        &["Basic", "Digest", "NTLM", "Negotiate", "Kerberos"];

    /// Selection order when the server offers several schemes.
    pub const PRIORITY: &'static [AuthScheme] = &[
        AuthScheme::Basic,
        AuthScheme::Digest,
        AuthScheme::Ntlm,
        AuthScheme::Negotiate,
        AuthScheme::Kerberos,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Basic" => Some(Self::Basic),
            "Digest" => Some(Self::Digest),
            "NTLM" => Some(Self::Ntlm),
            "Negotiate" => Some(Self::Negotiate),
            "Kerberos" => Some(Self::Kerberos),
            _ => None,
        }
    }

    /// The token that appears on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Basic => "Basic",
            Self::Digest => "Digest",
            Self::Ntlm => "NTLM",
            Self::Negotiate => "Negotiate",
            Self::Kerberos => "Kerberos",
        }
    }
}

/// Find the byte offset of a scheme token inside a challenge value.
/// Folded headers can place the token mid-value, so the match is
/// unanchored, case-insensitive, and bounded by non-alphanumerics.
pub(crate) fn find_scheme(challenge: &str, token: &str) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let hay = challenge.as_bytes();
    let needle = token.as_bytes();
    if hay.len() < needle.len() {
        return None;
    }
    for start in 0..=hay.len() - needle.len() {
        let window = &hay[start..start + needle.len()];
        if !window
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
        {
            continue;
        }
        let before_ok = start == 0 || !hay[start - 1].is_ascii_alphanumeric();
        let end = start + needle.len();
        let after_ok = end == hay.len() || !hay[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(start);
        }
    }
    None
}

/// True when a challenge value offers the scheme token anywhere in the
/// line.
pub fn offers(challenge: &str, token: &str) -> bool {
    find_scheme(challenge, token).is_some()
}

/// Pull the base64 payload following a scheme token out of a
/// `WWW-Authenticate` value. A bare scheme offer (no payload) yields
/// `None`.
pub fn extract_token(value: &str, token: &str) -> Option<Vec<u8>> {
    let start = find_scheme(value, token)?;
    let rest = value[start + token.len()..].trim_start();
    let payload: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    if payload.is_empty() {
        return None;
    }
    BASE64.decode(payload).ok().filter(|d| !d.is_empty())
}

/// Pick a scheme from the challenge lines. `available` filters schemes
/// the caller actually has credentials or providers for; `preferred`
/// (when offered and available) wins over the default priority order.
pub fn select_scheme(
    challenges: &[String],
    preferred: Option<AuthScheme>,
    available: impl Fn(AuthScheme) -> bool,
) -> Option<AuthScheme> {
    let offered = |scheme: AuthScheme| challenges.iter().any(|c| offers(c, scheme.token()));
    if let Some(p) = preferred {
        if p != AuthScheme::None && offered(p) && available(p) {
            return Some(p);
        }
    }
    AuthScheme::PRIORITY
        .iter()
        .copied()
        .find(|&scheme| offered(scheme) && available(scheme))
}
