//! End-to-end exercises of the client engine over a scripted transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use httpsession::{
    AuthScope, Client, ClientConfig, Credential, Error, Request, Transport,
};

/// One scripted connection: canned inbound bytes, captured outbound bytes.
struct MockStream {
    input: Cursor<Vec<u8>>,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out one scripted stream per connect, in order. A connect past the
/// end of the script list yields an empty stream, which reads as an
/// immediate EOF.
struct MockTransport {
    scripts: VecDeque<Vec<u8>>,
    sent: Vec<Rc<RefCell<Vec<u8>>>>,
    connects: Vec<(String, u16)>,
    handshakes: Vec<String>,
}

impl MockTransport {
    fn new(scripts: Vec<Vec<u8>>) -> Self {
        MockTransport {
            scripts: scripts.into(),
            sent: Vec::new(),
            connects: Vec::new(),
            handshakes: Vec::new(),
        }
    }

    fn sent_on(&self, conn: usize) -> String {
        String::from_utf8(self.sent[conn].borrow().clone()).unwrap()
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<MockStream> {
        self.connects.push((host.to_string(), port));
        let script = self.scripts.pop_front().unwrap_or_default();
        let sent = Rc::new(RefCell::new(Vec::new()));
        self.sent.push(sent.clone());
        Ok(MockStream {
            input: Cursor::new(script),
            sent,
        })
    }

    fn handshake(&mut self, stream: MockStream, host: &str) -> io::Result<MockStream> {
        self.handshakes.push(host.to_string());
        Ok(stream)
    }
}

fn resp(status_line: &str, headers: &[&str], body: &str) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for h in headers {
        out.push_str(h);
        out.push_str("\r\n");
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    out.into_bytes()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn proxied_session_with_both_scopes_and_redirects() {
    init_logging();
    let script = [
        resp(
            "407 Proxy Authentication Required",
            &[r#"Proxy-Authenticate: Digest realm="proxy", qop="auth", nonce="pn""#],
            "",
        ),
        resp("200 OK", &[], "ok"),
        resp("302 Found", &["Location: /hop1"], ""),
        resp("302 Found", &["Location: /hop2"], ""),
        resp("200 OK", &[], "done"),
        resp(
            "401 Unauthorized",
            &[r#"WWW-Authenticate: Digest realm="origin", qop="auth", nonce="on""#],
            "",
        ),
        resp("200 OK", &[], r#"{"authenticated": true, "user": "u"}"#),
    ]
    .concat();

    let config = ClientConfig::new("origin.test", 80)
        .with_proxy("proxy.test", 3128)
        .with_follow_redirects(true);
    let mut client = Client::new(config, MockTransport::new(vec![script]));
    client.set_credential(Credential::digest(AuthScope::Proxy, "hello", "world"));
    client.set_credential(Credential::digest(AuthScope::Origin, "u", "p"));

    let out = client
        .submit(&[
            Request::get("/start"),
            Request::get("/hops"),
            Request::get("/guarded"),
        ])
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(
        out.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![200, 200, 200]
    );
    assert_eq!(out[0].body, b"ok");
    assert_eq!(out[1].body, b"done");
    assert_eq!(out[2].body, br#"{"authenticated": true, "user": "u"}"#);

    // everything rode one proxy connection, absolute-form
    let transport = client.transport();
    assert_eq!(transport.connects, vec![("proxy.test".to_string(), 3128)]);
    let sent = transport.sent_on(0);
    assert!(sent.contains("GET http://origin.test/start HTTP/1.1\r\n"));
    assert!(sent.contains("GET http://origin.test/hop2 HTTP/1.1\r\n"));

    // the proxy digest session signed every exchange after the challenge
    assert!(sent.contains("nc=00000006"));
    assert!(!sent.contains("nc=00000007"));

    // the origin credential answered only its own challenge
    assert_eq!(sent.matches("Authorization: Digest username=\"u\"").count(), 1);
    assert!(sent.contains("uri=\"/guarded\""));
}

#[test]
fn preemptive_basic_goes_out_unprompted() {
    let script = resp("200 OK", &[], "fine");
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![script]),
    );
    client.set_credential(Credential::basic(AuthScope::Origin, "hello", "world"));

    let out = client.perform(Request::get("/")).unwrap();
    assert_eq!(out.status, 200);

    let sent = client.transport().sent_on(0);
    assert_eq!(sent.matches("GET / HTTP/1.1").count(), 1);
    assert!(sent.contains("Authorization: Basic aGVsbG86d29ybGQ=\r\n"));
}

#[test]
fn wrong_basic_credentials_surface_the_401() {
    let challenge = r#"WWW-Authenticate: Basic realm="gate""#;
    let script = [
        resp("401 Unauthorized", &[challenge], ""),
        resp("401 Unauthorized", &[challenge], ""),
    ]
    .concat();
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![script]),
    );
    client.set_credential(Credential::basic(AuthScope::Origin, "hello", "wrong"));

    let out = client.perform(Request::get("/")).unwrap();
    assert_eq!(out.status, 401);
    // one retry, not a loop
    assert_eq!(client.transport().sent_on(0).matches("GET /").count(), 2);
}

#[test]
fn origin_digest_challenge_roundtrip() {
    let script = [
        resp(
            "401 Unauthorized",
            &[r#"WWW-Authenticate: Digest realm="api", qop="auth", nonce="n1""#],
            "",
        ),
        resp("200 OK", &[], "in"),
    ]
    .concat();
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![script]),
    );
    client.set_credential(Credential::digest(AuthScope::Origin, "u", "p"));

    let out = client.perform(Request::get("/api")).unwrap();
    assert_eq!(out.status, 200);
    assert_eq!(out.body, b"in");

    let transport = client.transport();
    assert_eq!(transport.connects.len(), 1);
    let sent = transport.sent_on(0);
    assert!(sent.contains("Authorization: Digest username=\"u\", realm=\"api\""));
    assert!(sent.contains("nc=00000001"));
}

#[test]
fn unconfigured_407_passes_through() {
    let script = resp(
        "407 Proxy Authentication Required",
        &[r#"Proxy-Authenticate: Basic realm="proxy""#],
        "denied",
    );
    let config = ClientConfig::new("origin.test", 80).with_proxy("proxy.test", 3128);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    let out = client.perform(Request::get("/")).unwrap();
    assert_eq!(out.status, 407);
    assert_eq!(out.body, b"denied");
    // no credential, so no retry
    assert_eq!(client.transport().sent_on(0).matches("GET ").count(), 1);
}

#[test]
fn unrecognized_challenge_scheme_is_surfaced() {
    init_logging();
    let script = resp("401 Unauthorized", &["WWW-Authenticate: NTLM"], "");
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![script]),
    );
    client.set_credential(Credential::digest(AuthScope::Origin, "u", "p"));

    let out = client.perform(Request::get("/")).unwrap();
    assert_eq!(out.status, 401);
    assert_eq!(client.transport().sent_on(0).matches("GET /").count(), 1);
}

#[test]
fn keep_alive_cap_retires_the_connection() {
    let scripts = vec![resp("200 OK", &[], "a"), resp("200 OK", &[], "b")];
    let config = ClientConfig::new("origin.test", 80).with_keep_alive_max(1);
    let mut client = Client::new(config, MockTransport::new(scripts));

    client.perform(Request::get("/1")).unwrap();
    client.perform(Request::get("/2")).unwrap();

    assert_eq!(client.transport().connects.len(), 2);
}

#[test]
fn server_close_forces_a_reconnect() {
    let scripts = vec![
        resp("200 OK", &["Connection: close"], "a"),
        resp("200 OK", &[], "b"),
    ];
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(scripts),
    );

    let a = client.perform(Request::get("/1")).unwrap();
    let b = client.perform(Request::get("/2")).unwrap();
    assert_eq!(a.body, b"a");
    assert_eq!(b.body, b"b");
    assert_eq!(client.transport().connects.len(), 2);
}

#[test]
fn redirect_chain_hop_budget() {
    let script = [
        resp("302 Found", &["Location: /1"], ""),
        resp("302 Found", &["Location: /2"], ""),
        resp("302 Found", &["Location: /3"], ""),
    ]
    .concat();
    let config = ClientConfig::new("origin.test", 80)
        .with_follow_redirects(true)
        .with_max_redirects(2);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    match client.perform(Request::get("/0")) {
        Err(Error::TooManyRedirects { limit: 2 }) => {}
        other => panic!("expected redirect limit, got {other:?}"),
    }
}

#[test]
fn see_other_downgrades_the_follow_up() {
    let script = [
        resp("303 See Other", &["Location: /result"], ""),
        resp("200 OK", &[], "stored"),
    ]
    .concat();
    let config = ClientConfig::new("origin.test", 80).with_follow_redirects(true);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    let out = client
        .perform(Request::post("/submit", b"data".to_vec()))
        .unwrap();
    assert_eq!(out.body, b"stored");

    let sent = client.transport().sent_on(0);
    assert!(sent.contains("POST /submit HTTP/1.1"));
    assert!(sent.contains("GET /result HTTP/1.1"));
    // the body and its framing do not follow the hop
    assert_eq!(sent.matches("Content-Length:").count(), 1);
}

#[test]
fn pipelined_batch_keeps_submission_order() {
    let script = [
        resp("200 OK", &[], "A"),
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nB\r\n0\r\n\r\n".to_vec(),
        resp("404 Not Found", &[], "C"),
    ]
    .concat();
    let config = ClientConfig::new("origin.test", 80).with_pipelining(true);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    let out = client
        .submit(&[
            Request::get("/a"),
            Request::get("/b"),
            Request::get("/c"),
        ])
        .unwrap();

    assert_eq!(out[0].body, b"A");
    assert_eq!(out[1].body, b"B");
    assert_eq!((out[2].status, out[2].body.as_slice()), (404, &b"C"[..]));

    let transport = client.transport();
    assert_eq!(transport.connects.len(), 1);
    let sent = transport.sent_on(0);
    assert_eq!(sent.matches("GET /").count(), 3);
}

#[test]
fn pipelined_challenge_is_settled_after_the_batch_drains() {
    let script = [
        resp(
            "401 Unauthorized",
            &[r#"WWW-Authenticate: Digest realm="api", qop="auth", nonce="n1""#],
            "",
        ),
        resp("200 OK", &[], "B"),
        resp("200 OK", &[], "A2"),
    ]
    .concat();
    let config = ClientConfig::new("origin.test", 80).with_pipelining(true);
    let mut client = Client::new(config, MockTransport::new(vec![script]));
    client.set_credential(Credential::digest(AuthScope::Origin, "u", "p"));

    let out = client
        .submit(&[Request::get("/a"), Request::get("/b")])
        .unwrap();

    // slot order is preserved even though /a finished last on the wire
    assert_eq!(out[0].body, b"A2");
    assert_eq!(out[1].body, b"B");
    assert_eq!(client.transport().connects.len(), 1);
}

#[test]
fn pipelined_tail_is_resent_when_the_connection_dies() {
    init_logging();
    let scripts = vec![resp("200 OK", &[], "A"), resp("200 OK", &[], "B2")];
    let config = ClientConfig::new("origin.test", 80).with_pipelining(true);
    let mut client = Client::new(config, MockTransport::new(scripts));

    let out = client
        .submit(&[Request::get("/a"), Request::get("/b")])
        .unwrap();
    assert_eq!(out[0].body, b"A");
    assert_eq!(out[1].body, b"B2");
    assert_eq!(client.transport().connects.len(), 2);
}

#[test]
fn pipelined_loss_of_a_non_idempotent_slot_is_an_error() {
    let scripts = vec![resp("200 OK", &[], "A")];
    let config = ClientConfig::new("origin.test", 80).with_pipelining(true);
    let mut client = Client::new(config, MockTransport::new(scripts));

    let err = client
        .submit(&[
            Request::get("/a"),
            Request::post("/b", b"data".to_vec()),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionLost(_)));
}

#[test]
fn reconnect_budget_is_one_for_idempotent_requests() {
    // every connection reads as immediate EOF
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![]),
    );

    let err = client.perform(Request::get("/")).unwrap_err();
    assert!(matches!(err, Error::ConnectionLost(_)));
    assert_eq!(client.transport().connects.len(), 2);
}

#[test]
fn non_idempotent_requests_never_resend() {
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(vec![]),
    );

    let err = client
        .perform(Request::post("/pay", b"amount=1".to_vec()))
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionLost(_)));
    assert_eq!(client.transport().connects.len(), 1);
}

#[test]
fn close_discards_buffered_bytes() {
    // the first connection delivers a whole response plus the beginning of
    // an unsolicited second one, which ends up buffered in the reader
    let mut script = resp("200 OK", &[], "first");
    script.extend_from_slice(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 5\r\nsta");
    let scripts = vec![script, resp("200 OK", &[], "second")];
    let mut client = Client::new(
        ClientConfig::new("origin.test", 80),
        MockTransport::new(scripts),
    );

    let first = client.perform(Request::get("/1")).unwrap();
    assert_eq!(first.body, b"first");

    client.close();

    // the stale bytes went with the connection; the next request gets a
    // clean stream
    let second = client.perform(Request::get("/2")).unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"second");
    assert_eq!(client.transport().connects.len(), 2);
}

#[test]
fn tls_through_proxy_tunnels_then_handshakes() {
    let script = [
        b"HTTP/1.1 200 Connection Established\r\n\r\n".to_vec(),
        resp("200 OK", &[], "secure"),
    ]
    .concat();
    let config = ClientConfig::new("origin.test", 443)
        .with_tls(true)
        .with_proxy("proxy.test", 3128);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    let out = client.perform(Request::get("/secure")).unwrap();
    assert_eq!(out.body, b"secure");

    let transport = client.transport();
    assert_eq!(transport.connects, vec![("proxy.test".to_string(), 3128)]);
    assert_eq!(transport.handshakes, vec!["origin.test".to_string()]);

    let sent = transport.sent_on(0);
    assert!(sent.starts_with("CONNECT origin.test:443 HTTP/1.1\r\n"));
    // inside the tunnel the request-target is origin-form again
    assert!(sent.contains("GET /secure HTTP/1.1\r\nHost: origin.test\r\n"));
}

#[test]
fn tunnel_denial_is_the_requests_response() {
    let script = resp(
        "407 Proxy Authentication Required",
        &[r#"Proxy-Authenticate: Basic realm="proxy""#],
        "no tunnel",
    );
    let config = ClientConfig::new("origin.test", 443)
        .with_tls(true)
        .with_proxy("proxy.test", 3128);
    let mut client = Client::new(config, MockTransport::new(vec![script]));

    let out = client.perform(Request::get("/secure")).unwrap();
    assert_eq!(out.status, 407);
    assert_eq!(out.body, b"no tunnel");

    let transport = client.transport();
    assert!(transport.handshakes.is_empty());
    let sent = transport.sent_on(0);
    assert_eq!(sent.matches("CONNECT ").count(), 1);
    assert!(!sent.contains("GET /secure"));
}
