//! Request model and wire serializer.
//!
//! A request is either raw bytes the caller already framed, or a
//! structured specification the builder serializes, applying whatever
//! evasion transforms the configuration enables. The structured form is
//! what the auth coordinator replays across handshake legs.

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::evasion::{self, encode_form_component, rand_alpha, rand_alphanumeric};

/// One query/form parameter value: scalar or repeated.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Single(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Single(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::Multi(v)
    }
}

/// One part of a multipart/form-data body.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Structured request specification.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: String,
    pub uri: String,
    /// Raw query string for non-CGI requests.
    pub query: String,
    pub version: String,
    pub proto: String,
    pub vhost: Option<String>,
    pub port: Option<u16>,
    pub ssl: bool,
    pub agent: Option<String>,
    pub connection: Option<String>,
    pub cookie: Option<String>,
    /// Caller headers, emitted in insertion order.
    pub headers: Vec<(String, String)>,
    /// Opaque header block appended verbatim.
    pub raw_headers: String,
    pub data: Bytes,
    pub cgi: bool,
    pub vars_get: Vec<(String, ParamValue)>,
    pub vars_post: Vec<(String, ParamValue)>,
    pub vars_form_data: Vec<FormPart>,
    pub ctype: String,
    pub encode_params: bool,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            uri: "/".to_string(),
            query: String::new(),
            version: "1.1".to_string(),
            proto: "HTTP".to_string(),
            vhost: None,
            port: None,
            ssl: false,
            agent: None,
            connection: None,
            cookie: None,
            headers: Vec::new(),
            raw_headers: String::new(),
            data: Bytes::new(),
            cgi: false,
            vars_get: Vec::new(),
            vars_post: Vec::new(),
            vars_form_data: Vec::new(),
            ctype: "application/x-www-form-urlencoded".to_string(),
            encode_params: true,
        }
    }
}

impl RequestSpec {
    /// Raw request to a resource; the caller frames query and body.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// CGI-style request: query and body assembled from variables.
    pub fn cgi(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            cgi: true,
            ..Self::new(method, uri)
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = Some(vhost.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn raw_headers(mut self, raw: impl Into<String>) -> Self {
        self.raw_headers = raw.into();
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn ctype(mut self, ctype: impl Into<String>) -> Self {
        self.ctype = ctype.into();
        self
    }

    pub fn get_var(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.vars_get.push((name.into(), value.into()));
        self
    }

    pub fn post_var(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.vars_post.push((name.into(), value.into()));
        self
    }

    pub fn form_part(mut self, part: FormPart) -> Self {
        self.vars_form_data.push(part);
        self
    }

    /// First caller header value by name, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing header (case-insensitive) or append it.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Copy of this spec with the payload stripped, for body deferral
    /// during auth legs.
    pub fn without_body(&self) -> Self {
        let mut spec = self.clone();
        spec.data = Bytes::new();
        spec.vars_post.clear();
        spec.vars_form_data.clear();
        spec
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// A request as the transport sees it.
#[derive(Debug, Clone)]
pub enum Request {
    /// Pre-framed bytes, written verbatim. Transform hooks and auth
    /// replay do not apply.
    Raw(Bytes),
    /// A specification the builder serializes per configuration.
    Structured(RequestSpec),
}

impl Request {
    pub fn spec(&self) -> Option<&RequestSpec> {
        match self {
            Self::Raw(_) => None,
            Self::Structured(spec) => Some(spec),
        }
    }

    pub fn is_head(&self) -> bool {
        match self {
            Self::Raw(bytes) => bytes.len() >= 5 && bytes[..5].eq_ignore_ascii_case(b"HEAD "),
            Self::Structured(spec) => spec.is_head(),
        }
    }

    /// Serialize for the wire.
    pub fn to_wire(&self, config: &ClientConfig) -> Result<Bytes> {
        match self {
            Self::Raw(bytes) => Ok(bytes.clone()),
            Self::Structured(spec) => {
                let mut rng = rand::rng();
                serialize(spec, config, &mut rng).map(Bytes::from)
            }
        }
    }
}

impl From<RequestSpec> for Request {
    fn from(spec: RequestSpec) -> Self {
        Self::Structured(spec)
    }
}

fn ensure_ascii(value: &str, what: &str) -> Result<()> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(Error::encode(format!("{what} must be ASCII")))
    }
}

/// Serialize a request spec, applying the configured evasion
/// transforms. Deterministic for a given RNG, which is how the tests
/// pin padding widths and shuffles.
pub fn serialize(
    spec: &RequestSpec,
    config: &ClientConfig,
    rng: &mut impl Rng,
) -> Result<Vec<u8>> {
    ensure_ascii(&spec.method, "method")?;
    ensure_ascii(&spec.uri, "uri")?;
    ensure_ascii(&spec.query, "query")?;
    ensure_ascii(&spec.version, "version")?;
    ensure_ascii(&spec.proto, "proto")?;
    for (name, value) in &spec.headers {
        ensure_ascii(name, "header name")?;
        ensure_ascii(value, "header value")?;
    }
    if spec.cgi && !spec.query.is_empty() {
        return Err(Error::inconsistent(
            "CGI requests assemble their query from vars_get; raw query must be empty",
        ));
    }

    let method = evasion::mangle_method(
        &spec.method,
        config.flag("method_random_valid"),
        config.flag("method_random_invalid"),
        config.flag("method_random_case"),
        &mut *rng,
    );

    let uri = build_uri(spec, config, &mut *rng);

    let version_token = evasion::mangle_version(
        &spec.version,
        config.flag("version_random_valid"),
        config.flag("version_random_invalid"),
        &mut *rng,
    );

    let (body, body_ctype) = build_body(spec, config, &mut *rng);
    let chunked = config.chunked_size() > 0 && !body.is_empty();
    let is_post = spec.method.eq_ignore_ascii_case("POST");

    // Computed headers, suppressed when the caller supplies their own.
    let mut headers: Vec<(String, String)> = Vec::new();
    if spec.header_value("Host").is_none() {
        if let Some(vhost) = spec.vhost.as_deref().or(config.vhost()) {
            let host = match spec.port {
                Some(port) if port != if spec.ssl { 443 } else { 80 } => {
                    format!("{vhost}:{port}")
                }
                _ => vhost.to_string(),
            };
            headers.push(("Host".to_string(), host));
        }
    }
    if spec.header_value("User-Agent").is_none() {
        if let Some(agent) = spec.agent.as_deref().or(config.agent()) {
            headers.push(("User-Agent".to_string(), agent.to_string()));
        }
    }
    if let Some(connection) = &spec.connection {
        if spec.header_value("Connection").is_none() {
            headers.push(("Connection".to_string(), connection.clone()));
        }
    }
    if let Some(cookie) = &spec.cookie {
        if spec.header_value("Cookie").is_none() {
            headers.push(("Cookie".to_string(), cookie.clone()));
        }
    }
    if let Some(ctype) = body_ctype {
        if spec.header_value("Content-Type").is_none() {
            headers.push(("Content-Type".to_string(), ctype));
        }
    }
    if chunked {
        headers.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
    } else if (!body.is_empty() || is_post) && spec.header_value("Content-Length").is_none() {
        headers.push(("Content-Length".to_string(), body.len().to_string()));
    }
    headers.extend(spec.headers.iter().cloned());
    if config.flag("pad_fake_headers") {
        for _ in 0..config.pad_fake_headers_count() {
            let name_len = rng.random_range(6..=12);
            let value_len = rng.random_range(8..=16);
            let name = format!("X-{}", rand_alpha(name_len, &mut *rng));
            headers.push((name, rand_alphanumeric(value_len, &mut *rng)));
        }
    }

    // Request line.
    let mut out = Vec::with_capacity(512 + body.len());
    out.extend_from_slice(method.as_bytes());
    out.extend_from_slice(&evasion::padding(
        config.pad_method_uri_type(),
        config.pad_method_uri_count(),
        &mut *rng,
    ));
    out.extend_from_slice(uri.as_bytes());
    out.extend_from_slice(&evasion::padding(
        config.pad_uri_version_type(),
        config.pad_uri_version_count(),
        &mut *rng,
    ));
    out.extend_from_slice(spec.proto.as_bytes());
    out.push(b'/');
    out.extend_from_slice(version_token.as_bytes());
    out.extend_from_slice(b"\r\n");

    // Headers.
    let folding = config.flag("header_folding");
    for (name, value) in &headers {
        out.extend_from_slice(name.as_bytes());
        out.push(b':');
        if folding {
            out.extend_from_slice(b"\r\n ");
        } else {
            out.push(b' ');
        }
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    if !spec.raw_headers.is_empty() {
        out.extend_from_slice(spec.raw_headers.as_bytes());
        if !spec.raw_headers.ends_with("\r\n") {
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"\r\n");

    // Body.
    if chunked {
        for chunk in body.chunks(config.chunked_size()) {
            out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            out.extend_from_slice(chunk);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
    } else {
        out.extend_from_slice(&body);
    }

    Ok(out)
}

/// Assemble the request-target with the configured evasions applied.
fn build_uri(spec: &RequestSpec, config: &ClientConfig, rng: &mut impl Rng) -> String {
    let mut uri = if spec.uri.is_empty() {
        "/".to_string()
    } else {
        spec.uri.clone()
    };

    if config.flag("uri_dir_self_reference") {
        uri = evasion::insert_self_references(&uri);
    }
    if config.flag("uri_dir_fake_relative") {
        uri = evasion::insert_fake_relative(&uri, &mut *rng);
    }
    if config.flag("uri_fake_params_start") {
        uri = evasion::insert_fake_params_start(&uri);
    }
    if config.flag("uri_fake_end") {
        uri = evasion::append_fake_end(&uri, &mut *rng);
    }
    if config.flag("uri_use_backslashes") {
        uri = uri.replace('/', "\\");
    }
    uri = evasion::encode_uri(
        &uri,
        config.uri_encode_mode(),
        config.uri_encode_count(),
        &mut *rng,
    );

    // The scheme prefix goes on after encoding so `scheme://` survives
    // the aggressive modes.
    if config.flag("uri_full_url") {
        if let Some(vhost) = spec.vhost.as_deref().or(config.vhost()) {
            let scheme = if spec.ssl { "https" } else { "http" };
            let authority = match spec.port {
                Some(port) if port != if spec.ssl { 443 } else { 80 } => {
                    format!("{vhost}:{port}")
                }
                _ => vhost.to_string(),
            };
            uri = format!("{scheme}://{authority}{uri}");
        }
    }

    let query = if spec.cgi {
        let pad = if config.flag("pad_get_params") {
            config.pad_get_params_count()
        } else {
            0
        };
        build_query(
            &spec.vars_get,
            spec.encode_params,
            pad,
            config.flag("shuffle_get_params"),
            rng,
        )
    } else {
        spec.query.clone()
    };
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(&query);
    }
    uri
}

/// Assemble `name=value&...` pairs from ordered variables, with optional
/// random padding pairs and a shuffle.
fn build_query(
    vars: &[(String, ParamValue)],
    encode: bool,
    pad: usize,
    shuffle: bool,
    rng: &mut impl Rng,
) -> String {
    let render = |name: &str, value: &str| -> String {
        if encode {
            format!(
                "{}={}",
                encode_form_component(name),
                encode_form_component(value)
            )
        } else {
            format!("{name}={value}")
        }
    };

    let mut pairs: Vec<String> = Vec::new();
    for (name, value) in vars {
        match value {
            ParamValue::Single(v) => pairs.push(render(name, v)),
            ParamValue::Multi(list) => {
                for v in list {
                    pairs.push(render(name, v));
                }
            }
        }
    }
    for _ in 0..pad {
        let name_len = rng.random_range(3..=8);
        let value_len = rng.random_range(3..=12);
        let name = rand_alpha(name_len, &mut *rng);
        let value = rand_alphanumeric(value_len, &mut *rng);
        pairs.push(format!("{name}={value}"));
    }
    if shuffle {
        pairs.shuffle(&mut *rng);
    }
    pairs.join("&")
}

/// Assemble the body and the Content-Type it implies, if any.
fn build_body(
    spec: &RequestSpec,
    config: &ClientConfig,
    rng: &mut impl Rng,
) -> (Vec<u8>, Option<String>) {
    if spec.cgi && !spec.vars_form_data.is_empty() {
        let (body, boundary) = build_multipart(&spec.vars_form_data, rng);
        return (
            body,
            Some(format!("multipart/form-data; boundary={boundary}")),
        );
    }
    if spec.cgi && !spec.vars_post.is_empty() {
        let pad = if config.flag("pad_post_params") {
            config.pad_post_params_count()
        } else {
            0
        };
        let body = build_query(
            &spec.vars_post,
            spec.encode_params,
            pad,
            config.flag("shuffle_post_params"),
            rng,
        );
        return (body.into_bytes(), Some(spec.ctype.clone()));
    }
    let ctype = if spec.cgi && spec.method.eq_ignore_ascii_case("POST") {
        Some(spec.ctype.clone())
    } else {
        None
    };
    (spec.data.to_vec(), ctype)
}

fn build_multipart(parts: &[FormPart], rng: &mut impl Rng) -> (Vec<u8>, String) {
    let boundary = format!(
        "---------------------------{}",
        rand_alphanumeric(24, &mut *rng)
    );
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"", part.name).as_bytes(),
        );
        if let Some(filename) = &part.filename {
            body.extend_from_slice(format!("; filename=\"{filename}\"").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        if let Some(ctype) = &part.content_type {
            body.extend_from_slice(format!("Content-Type: {ctype}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (body, boundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn first_line(wire: &[u8]) -> &[u8] {
        let end = wire.windows(2).position(|w| w == b"\r\n").unwrap();
        &wire[..end]
    }

    fn wire_str(wire: &[u8]) -> String {
        String::from_utf8_lossy(wire).into_owned()
    }

    #[test]
    fn test_plain_get() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::new("GET", "/index.html").vhost("example.com");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert_eq!(first_line(&wire), b"GET /index.html HTTP/1.1");
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_nonstandard_port_in_host() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::new("GET", "/").vhost("example.com").port(8080);
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert!(wire_str(&wire).contains("Host: example.com:8080\r\n"));
    }

    #[test]
    fn test_request_line_padding_widths() {
        let mut cfg = ClientConfig::new();
        cfg.set("pad_method_uri_count", "3").unwrap();
        cfg.set("pad_uri_version_count", "5").unwrap();
        let spec = RequestSpec::new("GET", "/x");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET   /x     HTTP/1.1");
    }

    #[test]
    fn test_tab_padding() {
        let mut cfg = ClientConfig::new();
        cfg.set("pad_method_uri_count", "2").unwrap();
        cfg.set("pad_method_uri_type", "tab").unwrap();
        let spec = RequestSpec::new("GET", "/x");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET\t\t/x HTTP/1.1");
    }

    #[test]
    fn test_full_url_prefix() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("uri_full_url", true);
        let spec = RequestSpec::new("GET", "/a").vhost("target").port(8000);
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET http://target:8000/a HTTP/1.1");
    }

    #[test]
    fn test_backslash_substitution() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("uri_use_backslashes", true);
        let spec = RequestSpec::new("GET", "/a/b");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET \\a\\b HTTP/1.1");
    }

    #[test]
    fn test_self_reference_uri() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("uri_dir_self_reference", true);
        let spec = RequestSpec::new("GET", "/a");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET /./a HTTP/1.1");
    }

    #[test]
    fn test_cgi_query_assembly_order() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("GET", "/search")
            .get_var("q", "abc")
            .get_var("page", "2")
            .get_var("tag", vec!["x".to_string(), "y".to_string()]);
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET /search?q=abc&page=2&tag=x&tag=y HTTP/1.1");
    }

    #[test]
    fn test_cgi_param_encoding() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("GET", "/").get_var("q", "a b&c");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert_eq!(first_line(&wire), b"GET /?q=a%20b%26c HTTP/1.1");
    }

    #[test]
    fn test_cgi_with_raw_query_is_inconsistent() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("GET", "/").query("a=b");
        match serialize(&spec, &cfg, &mut rng()) {
            Err(Error::InconsistentRequest(_)) => {}
            other => panic!("expected InconsistentRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_get_param_padding_count() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("pad_get_params", true);
        cfg.set("pad_get_params_count", "4").unwrap();
        let spec = RequestSpec::cgi("GET", "/").get_var("real", "1");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let line = wire_str(first_line(&wire));
        let query = line.split('?').nth(1).unwrap().split(' ').next().unwrap();
        assert_eq!(query.split('&').count(), 5);
        assert!(query.contains("real=1"));
    }

    #[test]
    fn test_cgi_post_body_and_headers() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("POST", "/login")
            .post_var("user", "u")
            .post_var("pass", "p w");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert!(text.starts_with("POST /login HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        assert!(text.ends_with("\r\n\r\nuser=u&pass=p%20w"));
    }

    #[test]
    fn test_multipart_body() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("POST", "/upload")
            .form_part(FormPart {
                name: "file".to_string(),
                filename: Some("x.txt".to_string()),
                content_type: Some("text/plain".to_string()),
                data: b"payload".to_vec(),
            })
            .form_part(FormPart {
                name: "note".to_string(),
                filename: None,
                content_type: None,
                data: b"hi".to_vec(),
            });
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert!(text.contains("Content-Type: multipart/form-data; boundary="));
        assert!(text.contains("Content-Disposition: form-data; name=\"file\"; filename=\"x.txt\"\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("payload"));
        assert!(text.contains("name=\"note\"\r\n\r\nhi\r\n"));
        let boundary = text
            .split("boundary=")
            .nth(1)
            .unwrap()
            .split('\r')
            .next()
            .unwrap()
            .to_string();
        assert!(text.trim_end().ends_with(&format!("--{boundary}--")));
    }

    #[test]
    fn test_chunked_request_body() {
        let mut cfg = ClientConfig::new();
        cfg.set("chunked_size", "4").unwrap();
        let spec = RequestSpec::new("POST", "/put").data(&b"0123456789"[..]);
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("\r\n\r\n4\r\n0123\r\n4\r\n4567\r\n2\r\n89\r\n0\r\n\r\n"));
    }

    #[test]
    fn test_header_folding() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("header_folding", true);
        let spec = RequestSpec::new("GET", "/").vhost("example.com");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert!(wire_str(&wire).contains("Host:\r\n example.com\r\n"));
    }

    #[test]
    fn test_fake_headers_padding() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("pad_fake_headers", true);
        cfg.set("pad_fake_headers_count", "3").unwrap();
        let spec = RequestSpec::new("GET", "/");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert_eq!(text.matches("\r\nX-").count(), 3);
    }

    #[test]
    fn test_raw_headers_appended_verbatim() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::new("GET", "/").raw_headers("X-Exact: as written\r\n");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        assert!(wire_str(&wire).contains("X-Exact: as written\r\n\r\n"));
    }

    #[test]
    fn test_caller_headers_override_defaults() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::new("GET", "/")
            .vhost("default-host")
            .header("Host", "caller-host");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert!(text.contains("Host: caller-host\r\n"));
        assert!(!text.contains("default-host"));
    }

    #[test]
    fn test_method_mangling_leaves_rest_alone() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("method_random_invalid", true);
        let spec = RequestSpec::new("GET", "/x");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let line = wire_str(first_line(&wire));
        let mut parts = line.split(' ');
        let method = parts.next().unwrap();
        assert_ne!(method, "GET");
        assert_eq!(parts.next(), Some("/x"));
        assert_eq!(parts.next(), Some("HTTP/1.1"));
    }

    #[test]
    fn test_non_ascii_uri_is_encode_error() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::new("GET", "/caf\u{e9}");
        match serialize(&spec, &cfg, &mut rng()) {
            Err(Error::Encode(_)) => {}
            other => panic!("expected Encode error, got {other:?}"),
        }
    }

    #[test]
    fn test_without_body_keeps_content_length_zero_for_post() {
        let cfg = ClientConfig::new();
        let spec = RequestSpec::cgi("POST", "/x").post_var("a", "1");
        let deferred = spec.without_body();
        let wire = serialize(&deferred, &cfg, &mut rng()).unwrap();
        let text = wire_str(&wire);
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_with_header_replaces() {
        let spec = RequestSpec::new("GET", "/")
            .header("Authorization", "old")
            .with_header("authorization", "new");
        assert_eq!(spec.header_value("Authorization"), Some("new"));
        assert_eq!(
            spec.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case("authorization"))
                .count(),
            1
        );
    }

    #[test]
    fn test_shuffle_preserves_pairs() {
        let mut cfg = ClientConfig::new();
        cfg.set_bool("shuffle_get_params", true);
        let spec = RequestSpec::cgi("GET", "/")
            .get_var("a", "1")
            .get_var("b", "2")
            .get_var("c", "3");
        let wire = serialize(&spec, &cfg, &mut rng()).unwrap();
        let line = wire_str(first_line(&wire));
        let query = line.split('?').nth(1).unwrap().split(' ').next().unwrap();
        let mut pairs: Vec<&str> = query.split('&').collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec!["a=1", "b=2", "c=3"]);
    }
}
