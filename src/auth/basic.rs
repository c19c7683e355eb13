//! Basic authentication credentials encoding (RFC 2617 §2).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// `Authorization` value for user-id/password credentials.
pub fn authorization(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    format!("Basic {}", BASE64.encode(plain))
}

/// Parse a Basic `Authorization` value back into (username, password).
pub fn parse_authorization(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(BASE64.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
