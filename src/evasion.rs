//! Evasion primitives: URI encoding modes, request-line padding, and
//! method/version token mangling.
//!
//! These are deliberate deviations from strict HTTP/1.1 serialization,
//! parameterized so a scan can fingerprint how a server (or an inline
//! inspection device) normalizes them.

use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use rand::Rng;

/// URI percent/unicode encoding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UriEncodeMode {
    /// Percent-encode only unsafe characters.
    #[default]
    HexNormal,
    /// Percent-encode every character, slashes included.
    HexAll,
    /// Percent-encode a random subset of characters.
    HexRandom,
    /// Percent-encode every character except `/`.
    HexNoSlashes,
    /// `%u00XX` encode only unsafe characters.
    UNormal,
    /// `%u00XX` encode a random subset of characters.
    URandom,
    /// `%u00XX` encode every character.
    UAll,
}

impl UriEncodeMode {
    /// Accepted configuration spellings, in schema order.
    pub const CHOICES: &'static [&'static str] = &[
        "hex-normal",
        "hex-all",
        "hex-random",
        "hex-noslashes",
        "u-normal",
        "u-random",
        "u-all",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hex-normal" => Some(Self::HexNormal),
            "hex-all" => Some(Self::HexAll),
            "hex-random" => Some(Self::HexRandom),
            "hex-noslashes" => Some(Self::HexNoSlashes),
            "u-normal" => Some(Self::UNormal),
            "u-random" => Some(Self::URandom),
            "u-all" => Some(Self::UAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HexNormal => "hex-normal",
            Self::HexAll => "hex-all",
            Self::HexRandom => "hex-random",
            Self::HexNoSlashes => "hex-noslashes",
            Self::UNormal => "u-normal",
            Self::URandom => "u-random",
            Self::UAll => "u-all",
        }
    }
}

/// Padding character class for request-line gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadType {
    /// 0x20 only.
    #[default]
    Space,
    /// 0x09 only.
    Tab,
    /// Random mix of the whitespace bytes Apache tolerates between tokens.
    Apache,
}

impl PadType {
    pub const CHOICES: &'static [&'static str] = &["space", "tab", "apache"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "tab" => Some(Self::Tab),
            "apache" => Some(Self::Apache),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Tab => "tab",
            Self::Apache => "apache",
        }
    }
}

/// Whitespace bytes Apache's request-line parser accepts between tokens.
const APACHE_WHITESPACE: &[u8] = &[0x20, 0x09, 0x0b, 0x0c];

/// Produce `count` padding bytes of the given class. A count of zero
/// yields the single mandatory separator space.
pub fn padding(pad: PadType, count: usize, rng: &mut impl Rng) -> Vec<u8> {
    if count == 0 {
        return vec![b' '];
    }
    match pad {
        PadType::Space => vec![b' '; count],
        PadType::Tab => vec![b'\t'; count],
        PadType::Apache => (0..count)
            .map(|_| *APACHE_WHITESPACE.choose(&mut *rng).expect("non-empty set"))
            .collect(),
    }
}

/// Bytes that survive `hex-normal`/`u-normal` encoding: unreserved
/// characters, the sub-delims, and path separators.
///
/// `%` is deliberately kept raw so pre-encoded evasion sentinels
/// (`%3f`, `%00`) placed earlier in the pipeline survive the pass, and
/// `\` so backslash substitution composes with the normal modes. `?` is
/// always encoded so the real query separator stays authoritative.
fn is_uri_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'_'
                | b'.'
                | b'~'
                | b'/'
                | b'%'
                | b'\\'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
        )
}

fn push_hex(out: &mut String, b: u8) {
    out.push('%');
    out.push_str(&format!("{:02x}", b));
}

fn push_unicode(out: &mut String, b: u8) {
    out.push_str("%u00");
    out.push_str(&format!("{:02x}", b));
}

fn encode_pass(uri: &str, mode: UriEncodeMode, rng: &mut impl Rng) -> String {
    let mut out = String::with_capacity(uri.len() * 3);
    for &b in uri.as_bytes() {
        match mode {
            UriEncodeMode::HexNormal => {
                if is_uri_safe(b) {
                    out.push(b as char);
                } else {
                    push_hex(&mut out, b);
                }
            }
            UriEncodeMode::HexAll => push_hex(&mut out, b),
            UriEncodeMode::HexNoSlashes => {
                if b == b'/' {
                    out.push('/');
                } else {
                    push_hex(&mut out, b);
                }
            }
            UriEncodeMode::HexRandom => {
                if rng.random_bool(0.5) {
                    push_hex(&mut out, b);
                } else {
                    out.push(b as char);
                }
            }
            UriEncodeMode::UNormal => {
                if is_uri_safe(b) {
                    out.push(b as char);
                } else {
                    push_unicode(&mut out, b);
                }
            }
            UriEncodeMode::UAll => push_unicode(&mut out, b),
            UriEncodeMode::URandom => {
                if rng.random_bool(0.5) {
                    push_unicode(&mut out, b);
                } else {
                    out.push(b as char);
                }
            }
        }
    }
    out
}

/// Encode a URI path per mode, `count` times over (double/triple encoding).
pub fn encode_uri(uri: &str, mode: UriEncodeMode, count: usize, rng: &mut impl Rng) -> String {
    let mut out = uri.to_string();
    for _ in 0..count.max(1) {
        out = encode_pass(&out, mode, rng);
    }
    out
}

/// Percent-encode a form key or value for a query string or urlencoded
/// body. Unlike the path encoder this also encodes the pair separators.
pub fn encode_form_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for &b in value.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            push_hex(&mut out, b);
        }
    }
    out
}

/// Random ASCII-alpha token.
pub fn rand_alpha(len: usize, rng: &mut impl Rng) -> String {
    const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    (0..len)
        .map(|_| *ALPHA.choose(&mut *rng).expect("non-empty set") as char)
        .collect()
}

/// Random alphanumeric token.
pub fn rand_alphanumeric(len: usize, rng: &mut impl Rng) -> String {
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// Methods a server will accept without a body contract surprise.
const VALID_METHODS: &[&str] = &["GET", "POST", "HEAD"];

/// Replace or re-case a method token per the configured mangling.
pub fn mangle_method(
    method: &str,
    random_valid: bool,
    random_invalid: bool,
    random_case: bool,
    rng: &mut impl Rng,
) -> String {
    let mut out = if random_invalid {
        let len = rng.random_range(3..=10);
        rand_alpha(len, &mut *rng).to_uppercase()
    } else if random_valid {
        VALID_METHODS.choose(&mut *rng).expect("non-empty set").to_string()
    } else {
        method.to_string()
    };
    if random_case {
        out = random_case_token(&out, rng);
    }
    out
}

/// Randomize the case of each ASCII letter in a token.
pub fn random_case_token(token: &str, rng: &mut impl Rng) -> String {
    token
        .chars()
        .map(|c| {
            if rng.random_bool(0.5) {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// Versions real servers answer.
const VALID_VERSIONS: &[&str] = &["1.0", "1.1"];

/// Replace a version token per the configured mangling.
pub fn mangle_version(
    version: &str,
    random_valid: bool,
    random_invalid: bool,
    rng: &mut impl Rng,
) -> String {
    if random_invalid {
        let major = rng.random_range(0..=9);
        let minor = rng.random_range(0..=9);
        format!("{}.{}", major, minor)
    } else if random_valid {
        VALID_VERSIONS.choose(&mut *rng).expect("non-empty set").to_string()
    } else {
        version.to_string()
    }
}

/// Replace each `/` with `/./` (self-referential directory evasion).
pub fn insert_self_references(uri: &str) -> String {
    uri.replace('/', "/./")
}

/// Prefix each path segment with fake directories that immediately
/// back out via `..`, so normalization yields the original path while
/// naive matchers see only noise.
pub fn insert_fake_relative(uri: &str, rng: &mut impl Rng) -> String {
    let mut out = String::new();
    for segment in uri.split('/').filter(|s| !s.is_empty()) {
        let depth = rng.random_range(1..=3);
        for _ in 0..depth {
            out.push('/');
            let len = rng.random_range(3..=8);
            out.push_str(&rand_alphanumeric(len, &mut *rng));
        }
        for _ in 0..depth {
            out.push_str("/..");
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        uri.to_string()
    } else {
        if uri.ends_with('/') {
            out.push('/');
        }
        out
    }
}

/// Insert a pre-encoded fake query start (`/%3fa=b/../`) after the
/// leading slash. Inspectors that decode early see parameters begin
/// immediately; the server normalizes the detour away.
pub fn insert_fake_params_start(uri: &str) -> String {
    match uri.strip_prefix('/') {
        Some(rest) => format!("/%3fa=b/../{}", rest),
        None => uri.to_string(),
    }
}

/// Append a pre-encoded NUL sentinel and a decoy resource, so matchers
/// that stop at `%00` never see the real target end.
pub fn append_fake_end(uri: &str, rng: &mut impl Rng) -> String {
    let len = rng.random_range(3..=6);
    format!("{}%00{}.html", uri, rand_alpha(len, &mut *rng))
}
