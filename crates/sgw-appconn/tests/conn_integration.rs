//! Connection stack integration tests
//!
//! Drives real client connections against an in-process mock
//! application server speaking the wire protocol over TCP.

use parking_lot::Mutex;
use sgw_appconn::message::{
    ECHO_REQUEST, ECHO_RESPONSE, REGISTER_REQUEST, REGISTER_RESPONSE, REQUEST_ACCEPTED,
    REQUEST_FAILED, VERSION_NOT_SUPPORTED_ADVICE,
};
use sgw_appconn::{
    ActionRegistry, AppClient, ClientConfig, ConnState, Message, TypeRegistry, WorkerPool,
    PROTOCOL_VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// How the mock server answers register requests
#[derive(Clone, Copy, PartialEq)]
enum RegisterMode {
    Accept,
    Reject,
    Ignore,
}

/// In-process application server for the tests
struct MockServer {
    addr: std::net::SocketAddr,
    frames_seen: Arc<Mutex<Vec<u8>>>,
}

impl MockServer {
    async fn start(mode: RegisterMode) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames_seen = Arc::new(Mutex::new(Vec::new()));

        let seen = frames_seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                tokio::spawn(serve(stream, mode, seen.clone()));
            }
        });

        MockServer { addr, frames_seen }
    }

    fn seen_types(&self) -> Vec<u8> {
        self.frames_seen.lock().clone()
    }
}

/// Reads one raw frame: 4 header bytes, then a value byte or len + value.
async fn read_frame(stream: &mut TcpStream) -> std::io::Result<(u8, u16, u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let ty = header[3];
    let value = if ty < 128 {
        let mut value = [0u8; 1];
        stream.read_exact(&mut value).await?;
        value.to_vec()
    } else {
        let mut len = [0u8; 1];
        stream.read_exact(&mut len).await?;
        let mut value = vec![0u8; len[0] as usize];
        stream.read_exact(&mut value).await?;
        value
    };
    Ok((header[0], u16::from_be_bytes([header[1], header[2]]), ty, value))
}

async fn serve(mut stream: TcpStream, mode: RegisterMode, seen: Arc<Mutex<Vec<u8>>>) {
    while let Ok((_version, sequence_number, ty, _value)) = read_frame(&mut stream).await {
        seen.lock().push(ty);
        let reply = match ty {
            t if t == REGISTER_REQUEST.ty => match mode {
                RegisterMode::Accept => {
                    Some(Message::tv(REGISTER_RESPONSE.ty, REQUEST_ACCEPTED))
                }
                RegisterMode::Reject => Some(Message::tv(REGISTER_RESPONSE.ty, REQUEST_FAILED)),
                RegisterMode::Ignore => None,
            },
            t if t == ECHO_REQUEST.ty => Some(Message::tv(ECHO_RESPONSE.ty, 0xaa)),
            _ => None,
        };
        if let Some(mut reply) = reply {
            reply.set_sequence_number(sequence_number);
            let frame = reply.encode().unwrap();
            if stream.write_all(&frame).await.is_err() {
                break;
            }
        }
    }
}

fn client_config(server: &MockServer, size: usize, registrable: bool) -> ClientConfig {
    ClientConfig {
        address: server.addr.ip().to_string(),
        port: server.addr.port(),
        conn_index: 0,
        size,
        registrable,
        failsafe: false,
    }
}

async fn build_client(server: &MockServer, size: usize, registrable: bool) -> AppClient {
    AppClient::connect(
        1,
        client_config(server, size, registrable),
        Arc::new(TypeRegistry::new()),
        Arc::new(ActionRegistry::new()),
        WorkerPool::new(4),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_echo_end_to_end() {
    let server = MockServer::start(RegisterMode::Accept).await;
    let client = build_client(&server, 1, false).await;
    let conn = client.next_online().expect("connection online");

    let echo = Message::tv(ECHO_REQUEST.ty, 0xaa);
    let response = timeout(Duration::from_secs(5), conn.dispatch(echo))
        .await
        .expect("dispatch within default ttl");
    let response = response.expect("echo response");
    assert_eq!(response.ty(), ECHO_RESPONSE.ty);
    assert_eq!(response.value_byte(), 0xaa);
}

#[tokio::test]
async fn test_registration_accepted_goes_online() {
    let server = MockServer::start(RegisterMode::Accept).await;
    let client = build_client(&server, 1, true).await;
    assert_eq!(client.state(), ConnState::Online);
    assert_eq!(server.seen_types(), vec![REGISTER_REQUEST.ty]);
}

#[tokio::test]
async fn test_registration_rejected_stays_offline() {
    let server = MockServer::start(RegisterMode::Reject).await;
    let client = build_client(&server, 1, true).await;
    assert_eq!(client.state(), ConnState::Offline);
    assert!(client.next_online().is_none());

    // no keepalive was scheduled: the register request stays the only
    // frame the server ever saw
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.seen_types(), vec![REGISTER_REQUEST.ty]);
}

#[tokio::test]
async fn test_dispatch_timeout_returns_none() {
    let server = MockServer::start(RegisterMode::Ignore).await;
    let client = build_client(&server, 1, false).await;
    let conn = client.next_online().unwrap();

    let mut request = Message::tlv(REGISTER_REQUEST.ty, vec![]);
    request.set_time_to_live(Duration::from_millis(100));
    let started = std::time::Instant::now();
    let response = conn.dispatch(request).await;
    assert!(response.is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_round_robin_cycles_online_members() {
    let server = MockServer::start(RegisterMode::Accept).await;
    let client = build_client(&server, 3, false).await;

    let mut indices = Vec::new();
    for _ in 0..6 {
        indices.push(client.next_online().unwrap().conn_index());
    }
    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
}

#[tokio::test]
async fn test_version_mismatch_answered_with_advice() {
    // server side of the protocol: accept one client connection, push a
    // frame with a bad version byte, expect the advice back
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // version 0x01, sequence 7, echo request, sentinel
        stream.write_all(&[0x01, 0x00, 0x07, 0x01, 0xaa]).await.unwrap();
        read_frame(&mut stream).await.unwrap()
    });

    let _client = AppClient::connect(
        1,
        ClientConfig {
            address: addr.ip().to_string(),
            port: addr.port(),
            size: 1,
            registrable: false,
            failsafe: false,
            ..Default::default()
        },
        Arc::new(TypeRegistry::new()),
        Arc::new(ActionRegistry::new()),
        WorkerPool::new(2),
    )
    .await
    .unwrap();

    let (version, sequence_number, ty, value) =
        timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
    assert_eq!(version, PROTOCOL_VERSION);
    assert_eq!(sequence_number, 7);
    assert_eq!(ty, VERSION_NOT_SUPPORTED_ADVICE.ty);
    assert_eq!(value, vec![PROTOCOL_VERSION]);
}

#[tokio::test]
async fn test_failsafe_rebuilds_offline_member() {
    // server only starts accepting after the first pool build, so the
    // initial connection fails and the failsafe sweep repairs it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AppClient::connect(
        1,
        ClientConfig {
            address: addr.ip().to_string(),
            port: addr.port(),
            size: 1,
            registrable: false,
            failsafe: true,
            ..Default::default()
        },
        Arc::new(TypeRegistry::new()),
        Arc::new(ActionRegistry::new()),
        WorkerPool::new(2),
    )
    .await
    .unwrap();
    assert_eq!(client.state(), ConnState::Offline);

    // bring the server up on the same port before the sweep fires
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            tokio::spawn(serve(stream, RegisterMode::Accept, Arc::new(Mutex::new(Vec::new()))));
        }
    });

    timeout(Duration::from_secs(12), async {
        loop {
            if client.state() == ConnState::Online {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("failsafe sweep brought the client online");
    assert!(client.next_online().is_some());
}
