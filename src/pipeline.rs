//! The request engine: one reusable connection, auth retries, redirect
//! chains, and pipelined batches with responses in submission order.

use std::io::Write;

use log::{debug, warn};

use crate::authorize::Authorizer;
use crate::challenge::collect_challenges;
use crate::config::{ClientConfig, Target};
use crate::credentials::{Credential, CredentialStore};
use crate::enums::{AuthScheme, AuthScope, Method};
use crate::error::{Error, Result};
use crate::redirect;
use crate::transport::{PlainTransport, Transport};
use crate::tunnel::{self, TunnelStatus};
use crate::wire::{encode_request, BodyMode, Request, Response, ResponseReader, WireError};

/// What the current socket is attached to. A request whose key differs from
/// the connection's forces a reconnect; in plain-proxy mode the key is the
/// proxy alone, so redirect hops across hosts keep reusing one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnKey {
    Direct {
        host: String,
        port: u16,
        tls: bool,
    },
    Proxied {
        proxy: (String, u16),
    },
    Tunneled {
        proxy: (String, u16),
        authority: (String, u16),
    },
}

struct Connection<S> {
    stream: Option<S>,
    key: Option<ConnKey>,
    /// Responses served on this socket, for keep-alive retirement.
    served: u32,
    reader: ResponseReader,
}

impl<S> Connection<S> {
    fn new() -> Self {
        Connection {
            stream: None,
            key: None,
            served: 0,
            reader: ResponseReader::new(),
        }
    }
}

enum Attempt {
    Done(Response, bool),
    WriteFailed(std::io::Error),
    ReadFailed(WireError),
}

/// A synchronous HTTP/1.1 client over one connection, generic over how bytes
/// reach the peer.
///
/// All requests go to the configured origin (redirects may move individual
/// requests elsewhere). Basic and Digest credentials can be set for the
/// origin and proxy scopes independently; the engine answers challenges with
/// at most one retry per scope per request and otherwise surfaces the 401 or
/// 407 response unchanged.
pub struct Client<T: Transport> {
    transport: T,
    config: ClientConfig,
    store: CredentialStore,
    auth: Authorizer,
    conn: Connection<T::Stream>,
}

impl Client<PlainTransport> {
    /// A client over cleartext TCP. TLS targets need [`Client::new`] with a
    /// transport that implements the handshake.
    pub fn plain(config: ClientConfig) -> Self {
        Client::new(config, PlainTransport::new())
    }
}

impl<T: Transport> Client<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Client {
            transport,
            config,
            store: CredentialStore::new(),
            auth: Authorizer::new(),
            conn: Connection::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Install a credential, replacing any previous one for the same scope
    /// and scheme. The scope's Digest session restarts from the next
    /// challenge so stale state never signs for the new identity.
    pub fn set_credential(&mut self, cred: Credential) {
        self.auth.clear(cred.scope);
        self.store.set(cred);
    }

    /// Send one request and return its final response, after any auth
    /// retries and redirect hops.
    pub fn perform(&mut self, req: Request) -> Result<Response> {
        let mut reconnects = 1u32;
        self.drive(&req, None, &mut reconnects)
    }

    /// Send a batch; responses come back in submission order. With
    /// [`ClientConfig::pipelining`] enabled the whole batch is written before
    /// the first response is read.
    pub fn submit(&mut self, batch: &[Request]) -> Result<Vec<Response>> {
        let mut reconnects = 1u32;
        if self.config.pipelining && batch.len() > 1 {
            self.submit_pipelined(batch, &mut reconnects)
        } else {
            batch
                .iter()
                .map(|req| self.drive(req, None, &mut reconnects))
                .collect()
        }
    }

    /// Drop the connection. The next request reconnects.
    pub fn close(&mut self) {
        self.close_conn();
    }

    /// Run one request to completion. `pending` is a response already read
    /// off the wire for it (the pipelined path), which still needs auth and
    /// redirect processing.
    fn drive(
        &mut self,
        req: &Request,
        pending: Option<Response>,
        reconnects: &mut u32,
    ) -> Result<Response> {
        let mut req = req.clone();
        let mut target = self.config.target();
        let mut pending = pending;
        let mut origin_retried = false;
        let mut proxy_retried = false;
        let mut hops = 0usize;

        loop {
            let resp = match pending.take() {
                Some(resp) => resp,
                None => self.roundtrip(&req, &target, reconnects)?,
            };

            if resp.status == AuthScope::Origin.status_code()
                && !origin_retried
                && self.prepare_retry(AuthScope::Origin, &resp)?
            {
                origin_retried = true;
                continue;
            }

            // proxy challenges reach this loop only in plain-proxy mode; a
            // tunneled connection answers them during CONNECT
            if resp.status == AuthScope::Proxy.status_code()
                && !proxy_retried
                && self.uses_plain_proxy(&target)
                && self.prepare_retry(AuthScope::Proxy, &resp)?
            {
                proxy_retried = true;
                continue;
            }

            if self.config.follow_redirects {
                if let Some(red) = redirect::evaluate(&resp, &req, &target, &self.config)? {
                    hops += 1;
                    if hops > self.config.max_redirects {
                        return Err(Error::TooManyRedirects {
                            limit: self.config.max_redirects,
                        });
                    }
                    debug!(
                        "{} {} -> {}{}",
                        resp.status,
                        req.path,
                        red.target.authority(),
                        red.path
                    );
                    if red.target.host != target.host {
                        self.auth.clear(AuthScope::Origin);
                    }
                    if red.rewrite_to_get {
                        req.method = Method::GET;
                        req.body = None;
                        req.remove_header("content-length");
                        req.remove_header("transfer-encoding");
                        req.remove_header("content-type");
                    }
                    req.path = red.path;
                    target = red.target;
                    origin_retried = false;
                    proxy_retried = false;
                    continue;
                }
            }

            return Ok(resp);
        }
    }

    /// Parse the challenges on a 401/407 and arm the retry. `false` means
    /// the response should be surfaced instead: no parseable challenge, or
    /// no credential configured for it.
    fn prepare_retry(&mut self, scope: AuthScope, resp: &Response) -> Result<bool> {
        let challenges = match collect_challenges(resp, scope) {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => return Ok(false),
            Err(e) => {
                warn!("unusable {scope} challenge: {e}");
                return Ok(false);
            }
        };
        match self.store.answer(scope, &challenges) {
            Ok((cred, ch)) => {
                if cred.scheme == AuthScheme::Digest {
                    self.auth.absorb(scope, ch);
                }
                Ok(true)
            }
            Err(Error::AuthConfigMissing { scope, scheme }) => {
                debug!("no {scheme} credential for {scope} scope, surfacing the response");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// One wire exchange: make sure a usable connection exists, send, read
    /// one response. A failed write or an idle close before any response
    /// byte is retried once on a fresh connection for idempotent methods.
    fn roundtrip(
        &mut self,
        req: &Request,
        target: &Target,
        reconnects: &mut u32,
    ) -> Result<Response> {
        loop {
            if let Some(denied) = self.ensure_open(target)? {
                return Ok(denied);
            }
            let wire = self.encode_exchange(req, target)?;
            let mode = body_mode_for(&req.method);

            let attempt = {
                let conn = &mut self.conn;
                match conn.stream.as_mut() {
                    None => {
                        return Err(Error::ConnectionLost("connection unexpectedly gone".into()))
                    }
                    Some(stream) => match stream.write_all(&wire).and_then(|_| stream.flush()) {
                        Err(e) => Attempt::WriteFailed(e),
                        Ok(()) => match conn.reader.read_response(stream, mode) {
                            Ok((resp, close)) => Attempt::Done(resp, close),
                            Err(e) => Attempt::ReadFailed(e),
                        },
                    },
                }
            };

            match attempt {
                Attempt::Done(resp, close) => {
                    self.conn.served += 1;
                    if close || self.conn.served >= self.config.keep_alive_max {
                        self.close_conn();
                    }
                    return Ok(resp);
                }
                Attempt::WriteFailed(e) => {
                    self.close_conn();
                    if req.method.is_idempotent() && *reconnects > 0 {
                        *reconnects -= 1;
                        debug!("resending after write failure: {e}");
                        continue;
                    }
                    return Err(Error::ConnectionLost(format!("request write failed: {e}")));
                }
                Attempt::ReadFailed(WireError::CleanEof) => {
                    self.close_conn();
                    if req.method.is_idempotent() && *reconnects > 0 {
                        *reconnects -= 1;
                        debug!("connection was closed while idle, resending");
                        continue;
                    }
                    return Err(Error::ConnectionLost(
                        "server closed the connection before responding".into(),
                    ));
                }
                Attempt::ReadFailed(WireError::Io(e)) => {
                    self.close_conn();
                    return Err(Error::ConnectionLost(format!("response read failed: {e}")));
                }
                Attempt::ReadFailed(WireError::Malformed(m)) => {
                    self.close_conn();
                    return Err(Error::ConnectionLost(m));
                }
            }
        }
    }

    /// Write a whole batch, then demultiplex the responses in order.
    /// Answered slots still get their auth/redirect follow-ups, which run
    /// after the stream is fully drained so retries never interleave with
    /// outstanding responses.
    fn submit_pipelined(
        &mut self,
        batch: &[Request],
        reconnects: &mut u32,
    ) -> Result<Vec<Response>> {
        let target = self.config.target();
        if let Some(denied) = self.ensure_open(&target)? {
            return Ok(vec![denied; batch.len()]);
        }

        let mut wire = Vec::new();
        for req in batch {
            wire.extend_from_slice(&self.encode_exchange(req, &target)?);
        }
        {
            let conn = &mut self.conn;
            let write = match conn.stream.as_mut() {
                Some(stream) => stream.write_all(&wire).and_then(|_| stream.flush()),
                None => Ok(()),
            };
            if let Err(e) = write {
                debug!("pipelined write failed: {e}");
                self.close_conn();
            }
        }

        let mut raw: Vec<Option<Response>> = Vec::with_capacity(batch.len());
        for req in batch {
            let result = {
                let conn = &mut self.conn;
                match conn.stream.as_mut() {
                    None => {
                        raw.push(None);
                        continue;
                    }
                    Some(stream) => conn.reader.read_response(stream, body_mode_for(&req.method)),
                }
            };
            match result {
                Ok((resp, close)) => {
                    self.conn.served += 1;
                    raw.push(Some(resp));
                    if close {
                        // no further responses follow; unanswered slots are
                        // resent individually below
                        self.close_conn();
                    }
                }
                Err(e) => {
                    match e {
                        WireError::CleanEof => debug!("connection closed mid-batch"),
                        WireError::Malformed(ref m) => warn!("mid-batch framing error: {m}"),
                        WireError::Io(ref e) => warn!("mid-batch read error: {e}"),
                    }
                    self.close_conn();
                    raw.push(None);
                }
            }
        }
        if self.conn.served >= self.config.keep_alive_max {
            self.close_conn();
        }

        if raw.iter().any(|slot| slot.is_none()) {
            let unsafe_to_resend = batch
                .iter()
                .zip(&raw)
                .any(|(req, slot)| slot.is_none() && !req.method.is_idempotent());
            if unsafe_to_resend || *reconnects == 0 {
                return Err(Error::ConnectionLost(
                    "pipelined responses lost with the connection".into(),
                ));
            }
            *reconnects -= 1;
        }

        batch
            .iter()
            .zip(raw)
            .map(|(req, slot)| self.drive(req, slot, reconnects))
            .collect()
    }

    /// Make the connection match `target`, reconnecting (and tunneling, and
    /// handshaking) as needed. `Some(resp)` is a terminal proxy denial of
    /// the tunnel, surfaced as the request's response.
    fn ensure_open(&mut self, target: &Target) -> Result<Option<Response>> {
        let key = self.key_for(target);
        if self.conn.stream.is_some() && self.conn.key.as_ref() == Some(&key) {
            return Ok(None);
        }
        self.close_conn();

        let (host, port) = match &key {
            ConnKey::Direct { host, port, .. } => (host.as_str(), *port),
            ConnKey::Proxied { proxy } | ConnKey::Tunneled { proxy, .. } => {
                (proxy.0.as_str(), proxy.1)
            }
        };
        let mut stream = self.transport.connect(host, port)?;

        match &key {
            ConnKey::Tunneled { .. } => {
                match tunnel::establish(
                    &mut stream,
                    &mut self.conn.reader,
                    target,
                    &self.store,
                    &mut self.auth,
                )? {
                    TunnelStatus::Established => {
                        stream = self.transport.handshake(stream, &target.host)?;
                    }
                    TunnelStatus::Denied(resp) => {
                        self.conn.reader.clear();
                        return Ok(Some(resp));
                    }
                }
            }
            ConnKey::Direct { tls: true, .. } => {
                stream = self.transport.handshake(stream, &target.host)?;
            }
            _ => {}
        }

        self.conn.stream = Some(stream);
        self.conn.key = Some(key);
        Ok(None)
    }

    /// Serialize one request with its per-exchange auth headers. Through a
    /// cleartext proxy the request-target is absolute-form and a
    /// `Proxy-Authorization` rides on every request; a Digest proxy header
    /// signs the target exactly as it goes on the wire.
    fn encode_exchange(&mut self, req: &Request, target: &Target) -> Result<Vec<u8>> {
        let plain_proxy = self.uses_plain_proxy(target);
        let request_target = if plain_proxy {
            format!("http://{}{}", target.host_header(), req.path)
        } else {
            req.path.clone()
        };

        let mut work = req.clone();
        if let Some(value) = self.auth.preemptive(
            &self.store,
            AuthScope::Origin,
            &req.method,
            &req.path,
            req.body.as_deref(),
        )? {
            work.set_header("Authorization", value);
        }
        if plain_proxy {
            if let Some(value) = self.auth.preemptive(
                &self.store,
                AuthScope::Proxy,
                &req.method,
                &request_target,
                req.body.as_deref(),
            )? {
                work.set_header("Proxy-Authorization", value);
            }
        }

        Ok(encode_request(
            &work.method,
            &request_target,
            &target.host_header(),
            &work.headers,
            work.body.as_deref(),
        ))
    }

    fn key_for(&self, target: &Target) -> ConnKey {
        match &self.config.proxy {
            None => ConnKey::Direct {
                host: target.host.clone(),
                port: target.port,
                tls: target.tls,
            },
            Some(p) if target.tls => ConnKey::Tunneled {
                proxy: (p.host.clone(), p.port),
                authority: (target.host.clone(), target.port),
            },
            Some(p) => ConnKey::Proxied {
                proxy: (p.host.clone(), p.port),
            },
        }
    }

    fn uses_plain_proxy(&self, target: &Target) -> bool {
        self.config.proxy.is_some() && !target.tls
    }

    /// Drop the socket and everything scoped to it: buffered bytes, the
    /// served counter, and both Digest sessions.
    fn close_conn(&mut self) {
        if self.conn.stream.take().is_some() {
            debug!("connection closed");
        }
        self.conn.key = None;
        self.conn.served = 0;
        self.conn.reader.clear();
        self.auth.clear_all();
    }
}

fn body_mode_for(method: &Method) -> BodyMode {
    if *method == Method::HEAD {
        BodyMode::None
    } else {
        BodyMode::Normal
    }
}
