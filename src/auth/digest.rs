//! Digest authentication (RFC 2617): challenge parsing and response
//! computation, including the IIS parameter-quoting quirk.

use md5::{Digest, Md5};
use rand::seq::IndexedRandom;
use rand::Rng;
use sha2::Sha256;

/// Parsed parameters of a `Digest` challenge.
#[derive(Debug, Clone, Default)]
pub struct DigestChallenge {
    params: Vec<(String, String)>,
}

impl DigestChallenge {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn realm(&self) -> &str {
        self.get("realm").unwrap_or("")
    }

    pub fn nonce(&self) -> &str {
        self.get("nonce").unwrap_or("")
    }

    pub fn opaque(&self) -> Option<&str> {
        self.get("opaque").filter(|v| !v.is_empty())
    }

    pub fn algorithm(&self) -> &str {
        self.get("algorithm").unwrap_or("MD5")
    }

    /// The quality-of-protection token to use, when the challenge offers
    /// one we support.
    pub fn qop(&self) -> Option<&str> {
        self.get("qop")?
            .split(',')
            .map(str::trim)
            .find(|t| *t == "auth")
    }
}

/// Extract and parse a `Digest` challenge from a `WWW-Authenticate`
/// value. Header folding may place the scheme token mid-line, so the
/// match is unanchored. Parameters split on `, ` and values lose their
/// surrounding quotes.
pub fn parse_challenge(value: &str) -> Option<DigestChallenge> {
    let start = find_token(value, "Digest ")?;
    let rest = &value[start + "Digest ".len()..];

    let mut params = Vec::new();
    for part in rest.split(", ") {
        let part = part.trim().trim_start_matches(',').trim();
        if let Some((name, raw)) = part.split_once('=') {
            params.push((
                name.trim().to_ascii_lowercase(),
                raw.trim().trim_matches('"').to_string(),
            ));
        }
    }
    if params.is_empty() {
        None
    } else {
        Some(DigestChallenge { params })
    }
}

fn find_token(haystack: &str, token: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = token.as_bytes();
    if hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| {
        hay[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

fn hash(algorithm: &str, input: &str) -> String {
    let sha256 = algorithm
        .get(..7)
        .is_some_and(|p| p.eq_ignore_ascii_case("SHA-256"));
    if sha256 {
        hex::encode(Sha256::digest(input.as_bytes()))
    } else {
        hex::encode(Md5::digest(input.as_bytes()))
    }
}

/// Compute the `response` parameter for a challenge.
pub fn compute_response(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
    cnonce: &str,
    nc: u32,
) -> String {
    let algorithm = challenge.algorithm();
    let mut ha1 = hash(
        algorithm,
        &format!("{}:{}:{}", username, challenge.realm(), password),
    );
    if algorithm.to_ascii_lowercase().ends_with("-sess") {
        ha1 = hash(algorithm, &format!("{}:{}:{}", ha1, challenge.nonce(), cnonce));
    }
    let ha2 = hash(algorithm, &format!("{}:{}", method, uri));

    match challenge.qop() {
        Some(qop) => hash(
            algorithm,
            &format!(
                "{}:{}:{:08x}:{}:{}:{}",
                ha1,
                challenge.nonce(),
                nc,
                cnonce,
                qop,
                ha2
            ),
        ),
        None => hash(algorithm, &format!("{}:{}:{}", ha1, challenge.nonce(), ha2)),
    }
}

/// Render the `Authorization` value.
///
/// `iis` (the default) renders the parameter order and quoting IIS
/// expects, notably a quoted `qop`; the strict RFC 2617 form leaves
/// `qop` and `nc` unquoted.
#[allow(clippy::too_many_arguments)]
pub fn authorization(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
    cnonce: &str,
    nc: u32,
    iis: bool,
) -> String {
    let response = compute_response(username, password, method, uri, challenge, cnonce, nc);
    let algorithm = challenge.algorithm();

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
        username,
        challenge.realm(),
        challenge.nonce(),
        uri
    );
    match challenge.qop() {
        Some(qop) if iis => {
            header.push_str(&format!(
                ", cnonce=\"{}\", nc={:08x}, algorithm={}, response=\"{}\", qop=\"{}\"",
                cnonce, nc, algorithm, response, qop
            ));
        }
        Some(qop) => {
            header.push_str(&format!(
                ", response=\"{}\", qop={}, nc={:08x}, cnonce=\"{}\", algorithm={}",
                response, qop, nc, cnonce, algorithm
            ));
        }
        None => {
            header.push_str(&format!(", response=\"{}\", algorithm={}", response, algorithm));
        }
    }
    if let Some(opaque) = challenge.opaque() {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    header
}

/// Random client nonce.
pub fn random_cnonce(rng: &mut impl Rng) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..16)
        .map(|_| *HEX.choose(&mut *rng).expect("non-empty set") as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_challenge() -> DigestChallenge {
        parse_challenge(
            "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", \
             opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_strips_quotes() {
        let chal = rfc_challenge();
        assert_eq!(chal.realm(), "testrealm@host.com");
        assert_eq!(chal.nonce(), "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(chal.opaque(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
        assert_eq!(chal.qop(), Some("auth"));
        assert_eq!(chal.algorithm(), "MD5");
    }

    #[test]
    fn test_parse_unanchored_after_fold() {
        let chal =
            parse_challenge("NTLM , Digest realm=\"r\", nonce=\"n\", qop=\"auth\"").unwrap();
        assert_eq!(chal.realm(), "r");
        assert_eq!(chal.nonce(), "n");
        assert_eq!(chal.qop(), Some("auth"));
    }

    #[test]
    fn test_rfc2617_response_vector() {
        // RFC 2617 §3.5 worked example.
        let chal = rfc_challenge();
        let response = compute_response(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &chal,
            "0a4f113b",
            1,
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn test_iis_rendering_quotes_qop() {
        let chal = rfc_challenge();
        let header = authorization(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &chal,
            "0a4f113b",
            1,
            true,
        );
        assert!(header.contains("qop=\"auth\""));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("uri=\"/dir/index.html\""));
        assert!(header.contains("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn test_rfc_rendering_leaves_qop_unquoted() {
        let chal = rfc_challenge();
        let header = authorization(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &chal,
            "0a4f113b",
            1,
            false,
        );
        assert!(header.contains("qop=auth,"));
        assert!(!header.contains("qop=\"auth\""));
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
    }

    #[test]
    fn test_no_qop_challenge_omits_counters() {
        let chal = parse_challenge("Digest realm=\"r\", nonce=\"n\"").unwrap();
        let header = authorization("u", "p", "GET", "/", &chal, "whatever", 1, true);
        assert!(!header.contains("nc="));
        assert!(!header.contains("cnonce"));
        assert!(header.contains("response=\""));
    }

    #[test]
    fn test_random_cnonce_shape() {
        let mut rng = rand::rng();
        let c = random_cnonce(&mut rng);
        assert_eq!(c.len(), 16);
        assert!(c.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
