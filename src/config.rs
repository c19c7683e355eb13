//! Typed, validated client configuration.
//!
//! The configuration is a name/value bag with a declared schema: every
//! recognized option has a kind (string, integer, bool, or a closed enum)
//! and writes are coerced/validated against it. Unknown names are accepted
//! and stored as strings so callers can stash module-specific knobs.

use std::collections::BTreeMap;

use crate::auth::AuthScheme;
use crate::error::{Error, Result};
use crate::evasion::{PadType, UriEncodeMode};

/// Default cap on accumulated response body bytes (1 MiB).
pub const DEFAULT_READ_MAX_DATA: usize = 1024 * 1024;

/// Schema kind for a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Str,
    Int,
    Bool,
    Enum(&'static [&'static str]),
}

/// A stored option value after schema coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// NTLM/Negotiate provider token choices.
pub const PROVIDER_CHOICES: &[&str] = &["Negotiate", "NTLM"];

/// Look up the declared kind for an option name. Unknown names are strings.
pub fn option_kind(name: &str) -> OptionKind {
    match name {
        "read_max_data" | "uri_encode_count" | "chunked_size" | "pad_method_uri_count"
        | "pad_uri_version_count" | "pad_fake_headers_count" | "pad_get_params_count"
        | "pad_post_params_count" => OptionKind::Int,
        "partial" | "uri_full_url" | "uri_dir_self_reference" | "uri_dir_fake_relative"
        | "uri_use_backslashes" | "uri_fake_end" | "uri_fake_params_start"
        | "method_random_valid" | "method_random_invalid" | "method_random_case"
        | "version_random_valid" | "version_random_invalid" | "pad_fake_headers"
        | "pad_get_params" | "pad_post_params" | "shuffle_get_params"
        | "shuffle_post_params" | "header_folding" | "digest_auth_iis"
        | "no_body_for_auth" => OptionKind::Bool,
        "uri_encode_mode" => OptionKind::Enum(UriEncodeMode::CHOICES),
        "pad_method_uri_type" | "pad_uri_version_type" => OptionKind::Enum(PadType::CHOICES),
        "preferred_auth" => OptionKind::Enum(AuthScheme::CHOICES),
        "provider" => OptionKind::Enum(PROVIDER_CHOICES),
        _ => OptionKind::Str,
    }
}

/// Typed configuration bag for a [`Client`](crate::Client).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    values: BTreeMap<String, OptionValue>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option from its string form, coercing per schema.
    ///
    /// Bools accept `true`/`false` plus any value matching `^(t|y|1)`
    /// case-insensitively as true. Integers parse as decimal; anything
    /// unparsable stores 0. Enum writes must match a declared choice.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let coerced = match option_kind(name) {
            OptionKind::Str => OptionValue::Str(value.to_string()),
            OptionKind::Int => OptionValue::Int(value.trim().parse::<i64>().unwrap_or(0)),
            OptionKind::Bool => OptionValue::Bool(parse_bool(value)),
            OptionKind::Enum(choices) => {
                if choices.contains(&value) {
                    OptionValue::Str(value.to_string())
                } else {
                    return Err(Error::InvalidOption {
                        name: name.to_string(),
                        value: value.to_string(),
                        allowed: choices,
                    });
                }
            }
        };
        self.values.insert(name.to_string(), coerced);
        Ok(())
    }

    /// Set a bool option directly.
    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.values.insert(name.to_string(), OptionValue::Bool(value));
    }

    /// Set an integer option directly.
    pub fn set_int(&mut self, name: &str, value: i64) {
        self.values.insert(name.to_string(), OptionValue::Int(value));
    }

    /// Raw typed value for an option, if set.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Remove an option, restoring its default.
    pub fn unset(&mut self, name: &str) -> Option<OptionValue> {
        self.values.remove(name)
    }

    /// Produce a per-call view: `self` overlaid with `overrides`.
    /// Neither input is mutated.
    pub fn merge(&self, overrides: &ClientConfig) -> ClientConfig {
        let mut merged = self.clone();
        for (name, value) in &overrides.values {
            merged.values.insert(name.clone(), value.clone());
        }
        merged
    }

    pub(crate) fn str_opt(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub(crate) fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(OptionValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub(crate) fn flag(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(OptionValue::Bool(v)) => *v,
            _ => false,
        }
    }

    fn flag_or(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(OptionValue::Bool(v)) => *v,
            _ => default,
        }
    }

    // Identity / target.

    pub fn agent(&self) -> Option<&str> {
        self.str_opt("agent")
    }

    pub fn vhost(&self) -> Option<&str> {
        self.str_opt("vhost")
    }

    pub fn sni(&self) -> Option<&str> {
        self.str_opt("ssl_server_name_indication")
    }

    /// NTLM workstation/domain.
    pub fn domain(&self) -> &str {
        self.str_opt("domain").unwrap_or("")
    }

    pub fn username(&self) -> Option<&str> {
        self.str_opt("username").filter(|s| !s.is_empty())
    }

    pub fn password(&self) -> &str {
        self.str_opt("password").unwrap_or("")
    }

    // Transport.

    pub fn read_max_data(&self) -> usize {
        match self.int("read_max_data") {
            v if v > 0 => v as usize,
            _ => DEFAULT_READ_MAX_DATA,
        }
    }

    /// Return a partial response (instead of none) when a read times out.
    pub fn partial(&self) -> bool {
        self.flag("partial")
    }

    // URL evasion.

    pub fn uri_encode_mode(&self) -> UriEncodeMode {
        self.str_opt("uri_encode_mode")
            .and_then(UriEncodeMode::parse)
            .unwrap_or_default()
    }

    pub fn uri_encode_count(&self) -> usize {
        self.int("uri_encode_count").max(1) as usize
    }

    // Request-line padding.

    pub fn pad_method_uri_count(&self) -> usize {
        self.int("pad_method_uri_count").max(0) as usize
    }

    pub fn pad_uri_version_count(&self) -> usize {
        self.int("pad_uri_version_count").max(0) as usize
    }

    pub fn pad_method_uri_type(&self) -> PadType {
        self.str_opt("pad_method_uri_type")
            .and_then(PadType::parse)
            .unwrap_or_default()
    }

    pub fn pad_uri_version_type(&self) -> PadType {
        self.str_opt("pad_uri_version_type")
            .and_then(PadType::parse)
            .unwrap_or_default()
    }

    // Header/body padding.

    pub fn pad_fake_headers_count(&self) -> usize {
        self.int("pad_fake_headers_count").max(0) as usize
    }

    pub fn pad_get_params_count(&self) -> usize {
        self.int("pad_get_params_count").max(0) as usize
    }

    pub fn pad_post_params_count(&self) -> usize {
        self.int("pad_post_params_count").max(0) as usize
    }

    pub fn chunked_size(&self) -> usize {
        self.int("chunked_size").max(0) as usize
    }

    // Authentication.

    /// Quote digest parameters the way IIS expects. Defaults on.
    pub fn digest_auth_iis(&self) -> bool {
        self.flag_or("digest_auth_iis", true)
    }

    pub fn preferred_auth(&self) -> Option<AuthScheme> {
        self.str_opt("preferred_auth").and_then(AuthScheme::parse)
    }

    /// Omit the request payload during auth legs, sending it only on the
    /// final authenticated request.
    pub fn no_body_for_auth(&self) -> bool {
        self.flag("no_body_for_auth")
    }

    /// Explicit NTLMSSP provider token, when set to `NTLM`.
    pub fn provider_is_ntlm(&self) -> bool {
        self.str_opt("provider") == Some("NTLM")
    }
}

fn parse_bool(value: &str) -> bool {
    let v = value.trim();
    if v.eq_ignore_ascii_case("true") {
        return true;
    }
    if v.eq_ignore_ascii_case("false") {
        return false;
    }
    matches!(
        v.as_bytes().first(),
        Some(b't') | Some(b'T') | Some(b'y') | Some(b'Y') | Some(b'1')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_coercion() {
        let mut cfg = ClientConfig::new();
        cfg.set("partial", "yes").unwrap();
        assert!(cfg.partial());
        cfg.set("partial", "0").unwrap();
        assert!(!cfg.partial());
        cfg.set("partial", "TRUE").unwrap();
        assert!(cfg.partial());
        cfg.set("partial", "no").unwrap();
        assert!(!cfg.partial());
        cfg.set("partial", "1").unwrap();
        assert!(cfg.partial());
    }

    #[test]
    fn test_int_coercion_invalid_is_zero() {
        let mut cfg = ClientConfig::new();
        cfg.set("chunked_size", "512").unwrap();
        assert_eq!(cfg.chunked_size(), 512);
        cfg.set("chunked_size", "garbage").unwrap();
        assert_eq!(cfg.chunked_size(), 0);
    }

    #[test]
    fn test_enum_validation() {
        let mut cfg = ClientConfig::new();
        cfg.set("uri_encode_mode", "hex-all").unwrap();
        assert_eq!(cfg.uri_encode_mode(), UriEncodeMode::HexAll);

        let err = cfg.set("uri_encode_mode", "bogus").unwrap_err();
        match err {
            Error::InvalidOption { name, value, allowed } => {
                assert_eq!(name, "uri_encode_mode");
                assert_eq!(value, "bogus");
                assert!(allowed.contains(&"hex-random"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failed write must not clobber the previous value.
        assert_eq!(cfg.uri_encode_mode(), UriEncodeMode::HexAll);
    }

    #[test]
    fn test_unknown_names_store_strings() {
        let mut cfg = ClientConfig::new();
        cfg.set("x_custom_knob", "anything").unwrap();
        assert_eq!(
            cfg.get("x_custom_knob"),
            Some(&OptionValue::Str("anything".into()))
        );
    }

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::new();
        assert_eq!(cfg.read_max_data(), DEFAULT_READ_MAX_DATA);
        assert_eq!(cfg.uri_encode_count(), 1);
        assert!(cfg.digest_auth_iis());
        assert!(!cfg.no_body_for_auth());
        assert_eq!(cfg.uri_encode_mode(), UriEncodeMode::HexNormal);
        assert_eq!(cfg.pad_method_uri_type(), PadType::Space);
    }

    #[test]
    fn test_merge_does_not_mutate_base() {
        let mut base = ClientConfig::new();
        base.set("agent", "base-agent").unwrap();
        base.set("partial", "true").unwrap();

        let mut overrides = ClientConfig::new();
        overrides.set("agent", "call-agent").unwrap();

        let merged = base.merge(&overrides);
        assert_eq!(merged.agent(), Some("call-agent"));
        assert!(merged.partial());
        assert_eq!(base.agent(), Some("base-agent"));
    }

    #[test]
    fn test_preferred_auth_enum() {
        let mut cfg = ClientConfig::new();
        cfg.set("preferred_auth", "Digest").unwrap();
        assert_eq!(cfg.preferred_auth(), Some(AuthScheme::Digest));
        assert!(cfg.set("preferred_auth", "Bearer").is_err());
    }
}
