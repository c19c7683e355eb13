//! HTTP/1.x response model and incremental parser.
//!
//! The parser is a state machine fed arbitrary-size chunks as they arrive
//! from the transport. It owns all framing state (status line, folded
//! headers, chunked/counted/close-delimited bodies) so truncation and
//! partial results are ordinary data, never panics or lost bytes.

use std::net::SocketAddr;

use bytes::Bytes;

/// Parser position within a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AwaitingStatus,
    ProcessingHeader,
    ProcessingBody,
    Completed,
    Error,
}

/// Result of feeding bytes to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseCode {
    /// The message is not complete yet; feed more bytes.
    NeedMore,
    /// The message is complete.
    Completed,
    /// The framing is malformed; the connection is unusable.
    Error,
}

/// What went wrong while accumulating the body, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyError {
    #[default]
    None,
    /// The peer disconnected before the framing said the body was done.
    Truncated,
    /// The framing itself was malformed.
    Parse,
}

/// Ordered header multimap. Lookup is case-insensitive; insertion order
/// and duplicates are preserved exactly as received.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in order of appearance.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fold_into_last(&mut self, continuation: &str) -> bool {
        match self.entries.last_mut() {
            Some((_, value)) => {
                value.push(' ');
                value.push_str(continuation);
                true
            }
            None => false,
        }
    }
}

/// Body framing submode, decided when the header section ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// No body (1xx/204/304 or a HEAD exchange).
    None,
    /// Exactly `remaining` bytes left to consume.
    Counted { remaining: usize },
    /// `Transfer-Encoding: chunked` frames.
    Chunked(ChunkPhase),
    /// Body runs until the peer closes.
    UntilClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    /// Expecting a `<hex-size>[;ext]CRLF` line.
    Size,
    /// Consuming chunk payload.
    Data { remaining: usize },
    /// Expecting the CRLF that closes a chunk payload.
    DataEnd,
    /// Consuming optional trailer headers up to the blank line.
    Trailers,
}

/// A parsed (or in-progress) HTTP response.
#[derive(Debug)]
pub struct Response {
    pub version: String,
    pub code: u16,
    pub message: String,
    pub headers: Headers,
    body: Vec<u8>,
    /// Residual unparsed bytes held between feeds.
    bufq: Vec<u8>,
    /// Bytes left over after completion (start of a follow-on message).
    residual: Vec<u8>,
    state: ParseState,
    error: BodyError,
    max_data: usize,
    framing: Framing,
    /// The request this response answers was a HEAD request.
    head_request: bool,
    /// Serialized request bytes that elicited this response.
    pub request: Option<Bytes>,
    /// Resolved peer address at the time of the exchange.
    pub peerinfo: Option<SocketAddr>,
}

impl Response {
    /// New parser with the given body cap.
    pub fn new(max_data: usize) -> Self {
        Self::for_request(max_data, false)
    }

    /// New parser for a response to a request with the given HEAD-ness.
    pub fn for_request(max_data: usize, head_request: bool) -> Self {
        Self {
            version: String::new(),
            code: 0,
            message: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            bufq: Vec::new(),
            residual: Vec::new(),
            state: ParseState::AwaitingStatus,
            error: BodyError::None,
            max_data,
            framing: Framing::None,
            head_request,
            request: None,
            peerinfo: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn error(&self) -> BodyError {
        self.error
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// `Set-Cookie` values, verbatim, for callers that track their own
    /// session state. No jar semantics.
    pub fn cookies(&self) -> Vec<&str> {
        self.headers.get_all("Set-Cookie")
    }

    /// Feed bytes from the transport. Once the parser reports
    /// `Completed` or `Error` further bytes are ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> ParseCode {
        match self.state {
            ParseState::Completed => return ParseCode::Completed,
            ParseState::Error => return ParseCode::Error,
            _ => {}
        }
        self.bufq.extend_from_slice(bytes);
        self.advance()
    }

    /// Signal transport EOF. In the header section the response is
    /// unusable; in a counted or chunked body the accumulated prefix is
    /// kept and flagged truncated; close-delimited bodies finish cleanly.
    pub fn close_input(&mut self) -> ParseCode {
        match self.state {
            ParseState::Completed => ParseCode::Completed,
            ParseState::Error => ParseCode::Error,
            ParseState::AwaitingStatus | ParseState::ProcessingHeader => self.fail(),
            ParseState::ProcessingBody => match self.framing {
                Framing::UntilClose => self.complete(),
                _ => {
                    self.error = BodyError::Truncated;
                    self.complete()
                }
            },
        }
    }

    /// Bytes that arrived after this message ended (e.g. a final response
    /// glued to a `100 Continue`). Draining them is the caller's job.
    pub fn take_residual(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.residual)
    }

    /// True when the trickle accommodation applies: a completed text/html
    /// body with no declared length that never closed its document.
    pub(crate) fn wants_trickle(&self) -> bool {
        self.state == ParseState::Completed
            && self.headers.get("Content-Length").is_none()
            && self
                .headers
                .get("Content-Type")
                .and_then(|ct| ct.get(..9))
                .map(|p| p.eq_ignore_ascii_case("text/html"))
                .unwrap_or(false)
            && !contains_ignore_case(&self.body, b"</html>")
    }

    /// Append late body bytes gathered by the trickle loop.
    pub(crate) fn append_trickle(&mut self, bytes: &[u8]) {
        let room = self.max_data.saturating_sub(self.body.len());
        self.body.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    /// Re-serialize the message. Headers keep their received order and
    /// duplicates; folded values come out unfolded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(format!("HTTP/{} {}", self.version, self.code).as_bytes());
        if !self.message.is_empty() {
            out.push(b' ');
            out.extend_from_slice(self.message.as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    fn advance(&mut self) -> ParseCode {
        loop {
            match self.state {
                ParseState::AwaitingStatus => {
                    let Some(end) = find_crlf(&self.bufq) else {
                        return ParseCode::NeedMore;
                    };
                    let line = String::from_utf8_lossy(&self.bufq[..end]).into_owned();
                    self.bufq.drain(..end + 2);
                    match parse_status_line(&line) {
                        Some((version, code, message)) => {
                            self.version = version;
                            self.code = code;
                            self.message = message;
                            self.state = ParseState::ProcessingHeader;
                        }
                        None => return self.fail(),
                    }
                }
                ParseState::ProcessingHeader => {
                    let Some(end) = find_crlf(&self.bufq) else {
                        return ParseCode::NeedMore;
                    };
                    let line = String::from_utf8_lossy(&self.bufq[..end]).into_owned();
                    self.bufq.drain(..end + 2);

                    if line.is_empty() {
                        match self.decide_framing() {
                            Ok(ParseCode::Completed) => return ParseCode::Completed,
                            Ok(_) => self.state = ParseState::ProcessingBody,
                            Err(()) => return self.fail(),
                        }
                    } else if line.starts_with(' ') || line.starts_with('\t') {
                        // Obsolete folding: continuation belongs to the
                        // previous header value.
                        if !self.headers.fold_into_last(line.trim()) {
                            return self.fail();
                        }
                    } else {
                        let Some((name, value)) = line.split_once(':') else {
                            return self.fail();
                        };
                        self.headers.push(name.trim(), value.trim());
                    }
                }
                ParseState::ProcessingBody => return self.advance_body(),
                ParseState::Completed => return ParseCode::Completed,
                ParseState::Error => return ParseCode::Error,
            }
        }
    }

    /// Pick the body submode once the header section ends.
    fn decide_framing(&mut self) -> Result<ParseCode, ()> {
        if matches!(self.code, 100..=199 | 204 | 304) || self.head_request {
            self.framing = Framing::None;
            return Ok(self.complete());
        }
        let chunked = self
            .headers
            .get("Transfer-Encoding")
            .map(|te| {
                te.split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false);
        if chunked {
            self.framing = Framing::Chunked(ChunkPhase::Size);
            return Ok(ParseCode::NeedMore);
        }
        if let Some(cl) = self.headers.get("Content-Length") {
            let Ok(len) = cl.trim().parse::<usize>() else {
                return Err(());
            };
            if len == 0 {
                self.framing = Framing::None;
                return Ok(self.complete());
            }
            self.framing = Framing::Counted { remaining: len };
            return Ok(ParseCode::NeedMore);
        }
        self.framing = Framing::UntilClose;
        Ok(ParseCode::NeedMore)
    }

    fn advance_body(&mut self) -> ParseCode {
        loop {
            match self.framing {
                Framing::None => return self.complete(),
                Framing::Counted { remaining } => {
                    if self.bufq.is_empty() {
                        return ParseCode::NeedMore;
                    }
                    let take = remaining.min(self.bufq.len());
                    let chunk: Vec<u8> = self.bufq.drain(..take).collect();
                    if self.append_body(&chunk) {
                        return self.complete();
                    }
                    let left = remaining - take;
                    self.framing = Framing::Counted { remaining: left };
                    if left == 0 {
                        return self.complete();
                    }
                    return ParseCode::NeedMore;
                }
                Framing::UntilClose => {
                    if self.bufq.is_empty() {
                        return ParseCode::NeedMore;
                    }
                    let chunk: Vec<u8> = std::mem::take(&mut self.bufq);
                    if self.append_body(&chunk) {
                        return self.complete();
                    }
                    return ParseCode::NeedMore;
                }
                Framing::Chunked(phase) => match phase {
                    ChunkPhase::Size => {
                        let Some(end) = find_crlf(&self.bufq) else {
                            return ParseCode::NeedMore;
                        };
                        let line = String::from_utf8_lossy(&self.bufq[..end]).into_owned();
                        self.bufq.drain(..end + 2);
                        // Chunk extensions after ';' are ignored.
                        let size_part = line.split(';').next().unwrap_or("").trim();
                        let Ok(size) = usize::from_str_radix(size_part, 16) else {
                            return self.fail();
                        };
                        self.framing = Framing::Chunked(if size == 0 {
                            ChunkPhase::Trailers
                        } else {
                            ChunkPhase::Data { remaining: size }
                        });
                    }
                    ChunkPhase::Data { remaining } => {
                        if self.bufq.is_empty() {
                            return ParseCode::NeedMore;
                        }
                        let take = remaining.min(self.bufq.len());
                        let chunk: Vec<u8> = self.bufq.drain(..take).collect();
                        if self.append_body(&chunk) {
                            return self.complete();
                        }
                        let left = remaining - take;
                        self.framing = Framing::Chunked(if left == 0 {
                            ChunkPhase::DataEnd
                        } else {
                            ChunkPhase::Data { remaining: left }
                        });
                    }
                    ChunkPhase::DataEnd => {
                        if self.bufq.len() < 2 {
                            return ParseCode::NeedMore;
                        }
                        if &self.bufq[..2] != b"\r\n" {
                            return self.fail();
                        }
                        self.bufq.drain(..2);
                        self.framing = Framing::Chunked(ChunkPhase::Size);
                    }
                    ChunkPhase::Trailers => {
                        let Some(end) = find_crlf(&self.bufq) else {
                            return ParseCode::NeedMore;
                        };
                        let empty = end == 0;
                        self.bufq.drain(..end + 2);
                        if empty {
                            return self.complete();
                        }
                        // Trailer headers are consumed, not surfaced.
                    }
                },
            }
        }
    }

    /// Append to the body up to the cap. Returns true when the cap is hit
    /// and the message must complete with the accumulated prefix.
    fn append_body(&mut self, bytes: &[u8]) -> bool {
        let room = self.max_data.saturating_sub(self.body.len());
        if bytes.len() > room {
            self.body.extend_from_slice(&bytes[..room]);
            true
        } else {
            self.body.extend_from_slice(bytes);
            false
        }
    }

    fn complete(&mut self) -> ParseCode {
        self.state = ParseState::Completed;
        self.residual = std::mem::take(&mut self.bufq);
        ParseCode::Completed
    }

    fn fail(&mut self) -> ParseCode {
        self.state = ParseState::Error;
        self.error = BodyError::Parse;
        self.bufq.clear();
        ParseCode::Error
    }
}

fn parse_status_line(line: &str) -> Option<(String, u16, String)> {
    let rest = line.strip_prefix("HTTP/")?;
    let mut parts = rest.splitn(3, ' ');
    let version = parts.next().filter(|v| !v.is_empty())?;
    let code = parts.next()?.parse::<u16>().ok()?;
    let message = parts.next().unwrap_or("").to_string();
    Some((version.to_string(), code, message))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| {
        w.iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}
