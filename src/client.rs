//! The client facade: one socket, one in-flight request, and the
//! `send_recv` pipeline that ties the builder, parser, connection and
//! auth coordinator together.
//!
//! A `Client` is single-threaded and non-reentrant: request N fully
//! completes (response read or timeout) before request N+1 begins.
//! Parallel scanning uses one client per worker.

use std::net::SocketAddr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::auth::kerberos::KerberosProvider;
use crate::auth::ntlm::NtlmProvider;
use crate::auth::{self, basic, digest, ntlm, AuthScheme};
use crate::config::ClientConfig;
use crate::connection::{ChannelBinding, Conn};
use crate::error::{Error, Result};
use crate::request::{Request, RequestSpec};
use crate::response::{BodyError, ParseCode, Response};
use crate::transport::{SocketFactory, SocketParams, TcpFactory, Wait};

/// Result of one response read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The message completed cleanly.
    Complete(Response),
    /// The peer disconnected mid-body; the partial message is flagged
    /// truncated.
    Partial(Response),
    /// The peer disconnected before a usable message existed, or the
    /// framing was malformed.
    Closed,
    /// The envelope timeout expired. Carries whatever partial message
    /// could be salvaged.
    TimedOut(Option<Response>),
}

/// Hooks fired on every outbound and inbound message, auth legs
/// included. Observers must not mutate either object.
pub trait Observer: Send {
    fn on_request(&mut self, _request: &Request, _wire: &[u8]) {}
    fn on_response(&mut self, _response: Option<&Response>) {}
}

/// HTTP/1.x client bound to a single target.
pub struct Client {
    host: String,
    port: u16,
    ssl: bool,
    config: ClientConfig,
    factory: Box<dyn SocketFactory>,
    conn: Option<Conn>,
    /// Reuse the connection across sequential exchanges.
    pipelining: bool,
    observer: Option<Box<dyn Observer>>,
    ntlm_provider: Option<Box<dyn NtlmProvider>>,
    kerberos_provider: Option<Box<dyn KerberosProvider>>,
}

impl Client {
    /// Client over the default plaintext TCP factory.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_factory(host, port, Box::new(TcpFactory))
    }

    /// Client over a caller-supplied socket factory (TLS, proxies,
    /// in-memory test streams).
    pub fn with_factory(
        host: impl Into<String>,
        port: u16,
        factory: Box<dyn SocketFactory>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            ssl: false,
            config: ClientConfig::new(),
            factory,
            conn: None,
            pipelining: false,
            observer: None,
            ntlm_provider: None,
            kerberos_provider: None,
        }
    }

    pub fn set_ssl(&mut self, ssl: bool) {
        self.ssl = ssl;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    /// Set a configuration option from its string form.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.config.set(name, value)
    }

    pub fn set_observer(&mut self, observer: Box<dyn Observer>) {
        self.observer = Some(observer);
    }

    pub fn set_ntlm_provider(&mut self, provider: Box<dyn NtlmProvider>) {
        self.ntlm_provider = Some(provider);
    }

    pub fn set_kerberos_provider(&mut self, provider: Box<dyn KerberosProvider>) {
        self.kerberos_provider = Some(provider);
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Resolved peer address of the live connection, or none.
    pub fn peerinfo(&self) -> Option<SocketAddr> {
        self.conn.as_ref().and_then(|c| c.peerinfo())
    }

    /// NTLM channel-binding token for the live TLS session, or none.
    pub fn channel_binding(&self) -> Option<ChannelBinding> {
        self.conn.as_ref().and_then(|c| c.channel_binding())
    }

    /// Establish a connection, or reuse the existing one when
    /// pipelining is on.
    pub async fn connect(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.pipelining && self.conn.is_some() {
            return Ok(());
        }
        self.close().await;
        let config = self.effective_config();
        let params = SocketParams {
            peer_host: self.host.clone(),
            peer_hostname: config
                .sni()
                .map(str::to_string)
                .or_else(|| config.vhost().map(str::to_string)),
            peer_port: self.port,
            local_host: config.str_opt("local_host").map(str::to_string),
            local_port: config
                .str_opt("local_port")
                .and_then(|p| p.parse::<u16>().ok()),
            ssl: self.ssl,
            ssl_version: config.str_opt("ssl_version").map(str::to_string),
            ssl_key_log_file: config.str_opt("ssl_key_log_file").map(str::to_string),
            proxies: config.str_opt("proxies").map(str::to_string),
            connect_timeout: timeout,
        };
        let stream = self.factory.open(&params).await?;
        tracing::debug!(peer = ?stream.peer_addr(), "connected");
        self.conn = Some(Conn::new(stream));
        Ok(())
    }

    /// Orderly shutdown. Clears the socket and any NTLM/Kerberos
    /// session bound to it. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
    }

    /// Send a request and read the response, driving an authentication
    /// exchange when the server answers 401 with a usable challenge.
    ///
    /// `persist` keeps the connection open for the next sequential
    /// exchange. Auth failures are not errors: the last 401 comes back.
    pub async fn send_recv(
        &mut self,
        req: Request,
        wait: Wait,
        persist: bool,
    ) -> Result<Option<Response>> {
        let res = self.send_recv_once(&req, wait, persist, false).await?;
        match res {
            Some(r) if r.code == 401 && r.headers.contains("WWW-Authenticate") => {
                self.authenticate(&req, wait, persist, r).await
            }
            other => Ok(other),
        }
    }

    /// `send_recv` without the 401 delegation; auth legs use this to
    /// avoid recursing into the coordinator.
    async fn send_recv_once(
        &mut self,
        req: &Request,
        wait: Wait,
        persist: bool,
        handshake_leg: bool,
    ) -> Result<Option<Response>> {
        self.pipelining = persist;
        let config = self.effective_config();
        let mut wire = req.to_wire(&config)?;

        if let Some(observer) = self.observer.as_mut() {
            observer.on_request(req, &wire);
        }

        // Per-request transform hooks apply only to structured requests
        // on a connection with an established security context, and
        // never to handshake legs.
        if !handshake_leg && req.spec().is_some() {
            if let Some(conn) = self.conn.as_mut() {
                if let Some(ctx) = conn.session.ntlm_mut() {
                    wire = ctx.transform_request(wire);
                } else if let Some(enc) = conn.session.kerberos_mut() {
                    wire = enc.transform_request(wire);
                }
            }
        }

        self.send_request(&wire).await?;

        if matches!(wait, Wait::NoResponse) {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_response(None);
            }
            return Ok(None);
        }

        let outcome = self.read_response(wait, req.is_head()).await?;
        let peer = self.peerinfo();
        let (mut res, must_close) = match outcome {
            ReadOutcome::Complete(r) => (Some(r), false),
            ReadOutcome::Partial(r) => (Some(r), true),
            ReadOutcome::Closed => (None, true),
            ReadOutcome::TimedOut(partial) => {
                (if config.partial() { partial } else { None }, true)
            }
        };

        if !handshake_leg && req.spec().is_some() {
            if let (Some(r), Some(conn)) = (res.as_mut(), self.conn.as_mut()) {
                if let Some(ctx) = conn.session.ntlm_mut() {
                    ctx.transform_response(r);
                } else if let Some(enc) = conn.session.kerberos_mut() {
                    enc.transform_response(r);
                }
            }
        }

        if let Some(r) = res.as_mut() {
            r.request = Some(wire.clone());
            r.peerinfo = peer;
        }

        // The connection survives a clean exchange regardless of
        // `persist`; the pipelining flag decides reuse at the next
        // connect. Desynchronized or server-closed connections go now.
        let server_close = res
            .as_ref()
            .and_then(|r| r.header("Connection"))
            .map(|v| v.to_ascii_lowercase().contains("close"))
            .unwrap_or(false);
        if must_close || server_close {
            self.close().await;
        }

        if let Some(observer) = self.observer.as_mut() {
            observer.on_response(res.as_ref());
        }
        Ok(res)
    }

    /// Connect-or-reuse, then write the serialized request.
    async fn send_request(&mut self, wire: &[u8]) -> Result<()> {
        self.connect(None).await?;
        let conn = self.conn.as_mut().expect("connected above");
        conn.write_all(wire).await?;
        Ok(())
    }

    /// Read one response under the envelope timeout, applying the
    /// `100 Continue` workaround and the text/html trickle tolerance.
    async fn read_response(&mut self, wait: Wait, head_request: bool) -> Result<ReadOutcome> {
        let deadline = match wait {
            Wait::For(d) => Some(tokio::time::Instant::now() + d),
            _ => None,
        };
        let max_data = self.config.read_max_data();
        let mut skip_100 = false;
        let mut pending: Vec<u8> = Vec::new();

        'response: loop {
            let mut res = Response::for_request(max_data, head_request);
            let mut code = if pending.is_empty() {
                ParseCode::NeedMore
            } else {
                res.feed(&std::mem::take(&mut pending))
            };

            while code == ParseCode::NeedMore {
                let Some(conn) = self.conn.as_mut() else {
                    return Ok(ReadOutcome::Closed);
                };
                let mut buf = [0u8; 8192];
                let read = conn.read_some(&mut buf);
                let result = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, read).await {
                        Ok(io) => io,
                        Err(_) => {
                            tracing::debug!("response read exceeded envelope timeout");
                            let partial = match res.close_input() {
                                ParseCode::Completed => Some(res),
                                _ => None,
                            };
                            return Ok(ReadOutcome::TimedOut(partial));
                        }
                    },
                    None => read.await,
                };
                // Read failures (reset, broken pipe) follow the same
                // policy as a peer close.
                let n = match result {
                    Ok(n) => n,
                    Err(err) => {
                        tracing::debug!("transport read failed: {err}");
                        0
                    }
                };
                if n == 0 {
                    self.conn = None;
                    code = res.close_input();
                    if code != ParseCode::Completed {
                        return Ok(ReadOutcome::Closed);
                    }
                } else {
                    code = res.feed(&buf[..n]);
                }
            }

            if code == ParseCode::Error {
                tracing::debug!("malformed response framing");
                self.close().await;
                return Ok(ReadOutcome::Closed);
            }

            if res.error() == BodyError::Truncated {
                return Ok(ReadOutcome::Partial(res));
            }

            // 100 Continue workaround: some stacks glue the real
            // response to the interim one; others need another read on
            // the same connection.
            if res.code == 100 && res.version == "1.1" && !skip_100 {
                let residual = res.take_residual();
                if residual.starts_with(b"HTTP/") {
                    pending = residual;
                } else {
                    skip_100 = true;
                }
                continue 'response;
            }

            if res.wants_trickle() {
                self.trickle(&mut res).await;
            }
            return Ok(ReadOutcome::Complete(res));
        }
    }

    /// Keep short-poll reading a completed text/html body that never
    /// closed its document, for servers that terminate prematurely.
    async fn trickle(&mut self, res: &mut Response) {
        let mut dead = false;
        for _ in 0..1000 {
            if !res.wants_trickle() {
                break;
            }
            let Some(conn) = self.conn.as_mut() else {
                break;
            };
            let mut buf = [0u8; 8192];
            match tokio::time::timeout(Duration::from_millis(50), conn.read_some(&mut buf)).await
            {
                Ok(Ok(0)) | Ok(Err(_)) => {
                    dead = true;
                    break;
                }
                Ok(Ok(n)) => res.append_trickle(&buf[..n]),
                Err(_) => break,
            }
        }
        if dead {
            self.conn = None;
        }
    }

    fn effective_config(&self) -> ClientConfig {
        let mut config = self.config.clone();
        if config.vhost().is_none() {
            let _ = config.set("vhost", &self.host);
        }
        config
    }

    fn scheme_available(&self, scheme: AuthScheme) -> bool {
        let have_user = self.config.username().is_some();
        match scheme {
            AuthScheme::Basic | AuthScheme::Digest => have_user,
            AuthScheme::Ntlm | AuthScheme::Negotiate => {
                have_user && self.ntlm_provider.is_some()
            }
            AuthScheme::Kerberos => self.kerberos_provider.is_some(),
            AuthScheme::None => false,
        }
    }

    /// Drive the challenge-response exchange for a 401. Returns the
    /// final response, or the original 401 when no scheme is usable.
    async fn authenticate(
        &mut self,
        req: &Request,
        wait: Wait,
        persist: bool,
        first: Response,
    ) -> Result<Option<Response>> {
        let Some(spec) = req.spec() else {
            // Raw requests cannot be replayed with credentials.
            return Ok(Some(first));
        };
        let spec = spec.clone();
        let challenges: Vec<String> = first
            .headers
            .get_all("WWW-Authenticate")
            .iter()
            .map(|v| v.to_string())
            .collect();
        let scheme = auth::select_scheme(&challenges, self.config.preferred_auth(), |s| {
            self.scheme_available(s)
        });
        let Some(scheme) = scheme else {
            tracing::debug!("401 with no usable auth scheme");
            return Ok(Some(first));
        };
        tracing::debug!(scheme = scheme.token(), "authenticating");

        match scheme {
            AuthScheme::Basic => self.basic_leg(&spec, wait, persist, first).await,
            AuthScheme::Digest => self.digest_leg(&spec, wait, persist, first, &challenges).await,
            AuthScheme::Ntlm | AuthScheme::Negotiate => {
                self.ntlm_legs(scheme, &spec, wait, persist, first).await
            }
            AuthScheme::Kerberos => self.kerberos_legs(&spec, wait, persist, first).await,
            AuthScheme::None => Ok(Some(first)),
        }
    }

    /// One leg of an auth exchange. Transport failures are swallowed:
    /// the caller falls back to the last valid response.
    async fn auth_leg(
        &mut self,
        req: Request,
        wait: Wait,
        persist: bool,
        handshake: bool,
    ) -> Result<Option<Response>> {
        match self.send_recv_once(&req, wait, persist, handshake).await {
            Ok(res) => Ok(res),
            Err(Error::Io(err)) => {
                tracing::debug!("auth leg aborted: {err}");
                self.close().await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn basic_leg(
        &mut self,
        spec: &RequestSpec,
        wait: Wait,
        persist: bool,
        first: Response,
    ) -> Result<Option<Response>> {
        let user = self.config.username().unwrap_or("").to_string();
        let pass = self.config.password().to_string();
        let authed = spec
            .clone()
            .with_header("Authorization", basic::authorization(&user, &pass));
        let res = self
            .auth_leg(Request::Structured(authed), wait, persist, false)
            .await?;
        Ok(Some(res.unwrap_or(first)))
    }

    async fn digest_leg(
        &mut self,
        spec: &RequestSpec,
        wait: Wait,
        persist: bool,
        first: Response,
        challenges: &[String],
    ) -> Result<Option<Response>> {
        let Some(challenge) = challenges.iter().find_map(|v| digest::parse_challenge(v))
        else {
            return Ok(Some(first));
        };
        let user = self.config.username().unwrap_or("").to_string();
        let pass = self.config.password().to_string();
        let cnonce = digest::random_cnonce(&mut rand::rng());
        let value = digest::authorization(
            &user,
            &pass,
            &spec.method,
            &spec.uri,
            &challenge,
            &cnonce,
            1,
            self.config.digest_auth_iis(),
        );
        let authed = spec.clone().with_header("Authorization", value);
        let res = self
            .auth_leg(Request::Structured(authed), wait, persist, false)
            .await?;
        Ok(Some(res.unwrap_or(first)))
    }

    /// NTLM/Negotiate: two legs on one persistent connection, plus a
    /// third carrying the real body when it was deferred.
    async fn ntlm_legs(
        &mut self,
        scheme: AuthScheme,
        spec: &RequestSpec,
        wait: Wait,
        persist: bool,
        first: Response,
    ) -> Result<Option<Response>> {
        let Some(provider) = self.ntlm_provider.as_ref() else {
            return Ok(Some(first));
        };
        let mut context = provider.new_context();
        let token = if scheme == AuthScheme::Ntlm || self.config.provider_is_ntlm() {
            "NTLM"
        } else {
            "Negotiate"
        };
        let domain = self.config.domain().to_string();
        let workstation = ntlm::random_workstation(&mut rand::rng());
        let type1 = context.negotiate(&domain, &workstation)?;

        let defer = self.config.no_body_for_auth();
        let leg_spec = if defer { spec.without_body() } else { spec.clone() };

        let leg1 = leg_spec
            .clone()
            .with_header("Authorization", format!("{token} {}", BASE64.encode(&type1)));
        let Some(r1) = self
            .auth_leg(Request::Structured(leg1), wait, true, true)
            .await?
        else {
            return Ok(Some(first));
        };

        let Some(type2) = r1
            .headers
            .get_all("WWW-Authenticate")
            .iter()
            .find_map(|v| auth::extract_token(v, token))
        else {
            // No Type-2 challenge came back; that 401 is the answer.
            return Ok(Some(r1));
        };

        let binding = self.channel_binding();
        let type3 = context.authenticate(&type2, binding.as_ref())?;
        let leg2 = leg_spec
            .with_header("Authorization", format!("{token} {}", BASE64.encode(&type3)));
        // Every leg pins the connection: the handshake authenticates the
        // socket, not the credentials alone. The caller's persist choice
        // takes effect again at the next connect.
        let Some(r2) = self
            .auth_leg(Request::Structured(leg2), wait, true, true)
            .await?
        else {
            return Ok(Some(r1));
        };

        if let Some(conn) = self.conn.as_mut() {
            conn.session.set_ntlm(context);
        }

        if defer {
            let Some(r3) = self
                .auth_leg(Request::Structured(spec.clone()), wait, true, false)
                .await?
            else {
                return Ok(Some(r2));
            };
            self.pipelining = persist;
            return Ok(Some(r3));
        }
        self.pipelining = persist;
        Ok(Some(r2))
    }

    /// Kerberos: the external authenticator produces the initial token;
    /// the server's mutual-auth blob yields the session encryptor.
    async fn kerberos_legs(
        &mut self,
        spec: &RequestSpec,
        wait: Wait,
        persist: bool,
        first: Response,
    ) -> Result<Option<Response>> {
        let Some(provider) = self.kerberos_provider.as_ref() else {
            return Ok(Some(first));
        };
        let mut authenticator = provider.new_authenticator();
        let token = authenticator.initial_token()?;

        let defer = self.config.no_body_for_auth();
        let leg_spec = if defer { spec.without_body() } else { spec.clone() };

        let leg1 = leg_spec
            .with_header("Authorization", format!("Kerberos {}", BASE64.encode(&token)));
        let Some(r1) = self
            .auth_leg(Request::Structured(leg1), wait, true, true)
            .await?
        else {
            return Ok(Some(first));
        };

        if let Some(blob) = r1
            .headers
            .get_all("WWW-Authenticate")
            .iter()
            .find_map(|v| auth::extract_token(v, "Kerberos"))
        {
            let encryptor = authenticator.process_mutual_auth(&blob)?;
            if let Some(conn) = self.conn.as_mut() {
                conn.session.set_kerberos(encryptor);
            }
        }

        if defer {
            let Some(r2) = self
                .auth_leg(Request::Structured(spec.clone()), wait, true, false)
                .await?
            else {
                return Ok(Some(r1));
            };
            self.pipelining = persist;
            return Ok(Some(r2));
        }
        self.pipelining = persist;
        Ok(Some(r1))
    }
}
