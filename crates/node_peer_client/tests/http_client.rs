//! Client behaviour against real local servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use node_model::{Peer, Roster};
use node_peer_client::{ClientConfig, HttpPeerClient, PeersError, PeersListener};
use tokio::sync::mpsc;

const MOSAIC: &str = r#"[{"NetAddr":"localhost:6666","PubKeyHex":"0xAA","Moniker":"mosaic"}]"#;

#[derive(Debug)]
enum Outcome {
    Peers(Vec<Peer>),
    Failure(PeersError),
}

struct Recorder(mpsc::UnboundedSender<Outcome>);

impl PeersListener for Recorder {
    fn on_receive_peers(&self, peers: Vec<Peer>) {
        self.0.send(Outcome::Peers(peers)).ok();
    }

    fn on_failure(&self, error: PeersError) {
        self.0.send(Outcome::Failure(error)).ok();
    }
}

fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Outcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder(tx)), rx)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn client(connect_ms: u64, read_ms: u64) -> HttpPeerClient {
    HttpPeerClient::new(ClientConfig::new(connect_ms, read_ms)).unwrap()
}

#[tokio::test]
async fn receives_exactly_one_peer() {
    let addr = spawn(Router::new().route("/peers", get(|| async { MOSAIC }))).await;
    let (listener, mut outcomes) = recorder();

    let request = client(0, 0).request_peers(addr, Roster::Current, listener);

    match outcomes.recv().await.unwrap() {
        Outcome::Peers(peers) => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].moniker(), "mosaic");
            assert_eq!(peers[0].net_addr(), "localhost:6666");
            assert_eq!(peers[0].pub_key_hex(), "0xAA");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!request.is_pending());
    assert!(!request.cancel());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn genesis_roster_uses_its_own_path() {
    let app = Router::new()
        .route("/peers", get(|| async { "[]" }))
        .route("/genesispeers", get(|| async { MOSAIC }));
    let addr = spawn(app).await;

    let client = client(0, 0);
    assert_eq!(client.fetch_peers(addr, Roster::Genesis).await.unwrap().len(), 1);
    assert!(client.fetch_peers(addr, Roster::Current).await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_server_times_out() {
    let app = Router::new().route(
        "/peers",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(2_000)).await;
            MOSAIC
        }),
    );
    let addr = spawn(app).await;
    let (listener, mut outcomes) = recorder();

    let started = Instant::now();
    client(100, 100).request_peers(addr, Roster::Current, listener);

    let outcome = tokio::time::timeout(Duration::from_millis(3_000), outcomes.recv())
        .await
        .expect("no callback within 3s")
        .unwrap();
    assert!(matches!(outcome, Outcome::Failure(PeersError::Timeout)), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_millis(3_000));
}

#[tokio::test]
async fn refused_connection_is_connection_error() {
    let addr = closed_port().await;
    let result = client(1_000, 1_000).fetch_peers(addr, Roster::Current).await;
    assert_eq!(result, Err(PeersError::ConnectionError));
}

/// A listener with a zero backlog whose only queue slot is taken. Further
/// SYNs are dropped, so a connect attempt hangs instead of being refused.
fn saturated_listener() -> (socket2::Socket, std::net::TcpStream, SocketAddr) {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    socket.bind(&bind.into()).unwrap();
    socket.listen(0).unwrap();
    let addr = socket.local_addr().unwrap().as_socket().unwrap();
    let filler = std::net::TcpStream::connect(addr).unwrap();
    (socket, filler, addr)
}

#[tokio::test]
async fn connect_deadline_is_timeout_not_connection_error() {
    let (_socket, _filler, addr) = saturated_listener();

    let started = Instant::now();
    let result = client(100, 100).fetch_peers(addr, Roster::Current).await;
    assert_eq!(result, Err(PeersError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(3_000));
}

/// Serve one response by hand, writing the body in `chunks` pieces `gap` apart.
async fn spawn_trickle(body: &'static [u8], chunks: usize, gap: Duration) -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\n\
             content-type: application/json\r\n\
             content-length: {}\r\n\
             connection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        for piece in body.chunks(body.len().div_ceil(chunks)) {
            tokio::time::sleep(gap).await;
            stream.write_all(piece).await.unwrap();
            stream.flush().await.unwrap();
        }
    });
    addr
}

#[tokio::test]
async fn steady_trickle_stays_within_read_deadline() {
    // 7 pieces 80ms apart: well past connect + read overall, never a 200ms gap
    let addr = spawn_trickle(MOSAIC.as_bytes(), 7, Duration::from_millis(80)).await;

    let started = Instant::now();
    let peers = client(100, 200)
        .fetch_peers(addr, Roster::Current)
        .await
        .unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].moniker(), "mosaic");
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn stalled_body_times_out() {
    let addr = spawn_trickle(MOSAIC.as_bytes(), 2, Duration::from_millis(500)).await;
    let result = client(100, 200).fetch_peers(addr, Roster::Current).await;
    assert_eq!(result, Err(PeersError::Timeout));
}

#[tokio::test]
async fn malformed_bodies_are_invalid_json() {
    let app = Router::new()
        .route("/peers", get(|| async { "{ not json" }))
        .route(
            "/genesispeers",
            get(|| async { r#"{"NetAddr":"a","PubKeyHex":"b","Moniker":"c"}"# }),
        );
    let addr = spawn(app).await;
    let client = client(0, 0);

    assert_eq!(client.fetch_peers(addr, Roster::Current).await, Err(PeersError::InvalidJson));
    // a single object is not a list
    assert_eq!(client.fetch_peers(addr, Roster::Genesis).await, Err(PeersError::InvalidJson));
}

#[tokio::test]
async fn peer_with_null_field_is_invalid_json() {
    let app = Router::new().route(
        "/peers",
        get(|| async { r#"[{"NetAddr":"a","PubKeyHex":null,"Moniker":"c"}]"# }),
    );
    let addr = spawn(app).await;
    assert_eq!(
        client(0, 0).fetch_peers(addr, Roster::Current).await,
        Err(PeersError::InvalidJson)
    );
}

#[tokio::test]
async fn non_utf8_body_is_invalid_json() {
    let mut body = br#"[{"NetAddr":"a:1","PubKeyHex":"0x1","Moniker":""#.to_vec();
    body.extend_from_slice(b"\xff\xfe\"}]");
    let app = Router::new().route(
        "/peers",
        get(move || {
            let body = body.clone();
            async move { ([(axum::http::header::CONTENT_TYPE, "application/json")], body) }
        }),
    );
    let addr = spawn(app).await;
    assert_eq!(
        client(0, 0).fetch_peers(addr, Roster::Current).await,
        Err(PeersError::InvalidJson)
    );
}

#[tokio::test]
async fn error_status_is_unknown() {
    let app = Router::new().route(
        "/peers",
        get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let addr = spawn(app).await;
    assert_eq!(
        client(0, 0).fetch_peers(addr, Roster::Current).await,
        Err(PeersError::Unknown)
    );

    let missing = spawn(Router::new()).await;
    assert_eq!(
        client(0, 0).fetch_peers(missing, Roster::Genesis).await,
        Err(PeersError::Unknown)
    );
}

#[tokio::test]
async fn cancelled_request_never_calls_back() {
    let app = Router::new().route(
        "/peers",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            MOSAIC
        }),
    );
    let addr = spawn(app).await;
    let (listener, mut outcomes) = recorder();

    let request = client(0, 0).request_peers(addr, Roster::Current, listener);
    assert!(request.cancel());
    assert!(!request.cancel());
    assert!(request.is_cancelled());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn fetch_url_accepts_host_names() {
    let addr = spawn(Router::new().route("/peers", get(|| async { MOSAIC }))).await;
    let url = format!("http://localhost:{}/peers", addr.port());
    let peers = client(0, 0).fetch_url(&url).await.unwrap();
    assert_eq!(peers[0].moniker(), "mosaic");
}
