//! End-to-end tests: a real Socks5Server on loopback, driven with raw
//! SOCKS5 bytes over TCP.

use socks5d::Socks5Server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

const NO_AUTH_GREETING: [u8; 3] = [0x05, 0x01, 0x00];

/// Start a proxy on an OS-assigned port and return its address
async fn start_proxy() -> SocketAddr {
    let mut server = Socks5Server::new("127.0.0.1:0".parse().unwrap());
    let addr = server.bind().await.unwrap();
    tokio::spawn(server.run());
    addr
}

/// Start an upstream that echoes everything back
async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (mut rx, mut tx) = stream.split();
                let _ = tokio::io::copy(&mut rx, &mut tx).await;
            });
        }
    });
    addr
}

/// A listener with a full accept queue, so new connects to it hang while
/// the returned streams stay open
async fn stalled_listener() -> (TcpListener, Vec<TcpStream>, SocketAddr) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut queued = Vec::new();
    for _ in 0..64 {
        match timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => queued.push(stream),
            _ => return (listener, queued, addr),
        }
    }
    panic!("accept queue never filled");
}

async fn handshake(proxy: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(&NO_AUTH_GREETING).await.unwrap();
    let mut resp = [0u8; 2];
    stream.read_exact(&mut resp).await.unwrap();
    assert_eq!(resp, [0x05, 0x00]);
    stream
}

fn request(command: u8, target: SocketAddr) -> Vec<u8> {
    let mut buf = vec![0x05, command, 0x00];
    match target {
        SocketAddr::V4(addr) => {
            buf.push(0x01);
            buf.extend_from_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            buf.push(0x04);
            buf.extend_from_slice(&addr.ip().octets());
        }
    }
    buf.extend_from_slice(&target.port().to_be_bytes());
    buf
}

fn domain_request(command: u8, host: &str, port: u16) -> Vec<u8> {
    let mut buf = vec![0x05, command, 0x00, 0x03, host.len() as u8];
    buf.extend_from_slice(host.as_bytes());
    buf.extend_from_slice(&port.to_be_bytes());
    buf
}

async fn read_reply(stream: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    let read = timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("proxy did not close the connection");
    // A reset also counts as closed
    if read.is_ok() {
        assert!(rest.is_empty(), "unexpected bytes after close: {rest:?}");
    }
}

#[tokio::test]
async fn test_greeting_reply_only_after_full_message() {
    let proxy = start_proxy().await;
    let greeting = [0x05, 0x03, 0x02, 0x01, 0x00];

    for split in 1..greeting.len() {
        let mut stream = TcpStream::connect(proxy).await.unwrap();
        stream.set_nodelay(true).unwrap();

        stream.write_all(&greeting[..split]).await.unwrap();
        let mut byte = [0u8; 1];
        assert!(
            timeout(Duration::from_millis(50), stream.read(&mut byte))
                .await
                .is_err(),
            "reply before greeting completed (split at {split})"
        );

        stream.write_all(&greeting[split..]).await.unwrap();
        let mut resp = [0u8; 2];
        stream.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [0x05, 0x00]);
    }
}

#[tokio::test]
async fn test_connect_ipv4_reports_bound_address() {
    let proxy = start_proxy().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, target)).await.unwrap();

    let (_upstream, outbound_addr) = listener.accept().await.unwrap();
    let reply = read_reply(&mut stream).await;

    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(&reply[4..8], &[127, 0, 0, 1]);
    assert_eq!(u16::from_be_bytes([reply[8], reply[9]]), outbound_addr.port());
}

#[tokio::test]
async fn test_connect_by_domain_name() {
    let proxy = start_proxy().await;
    let echo = start_echo().await;

    let mut stream = handshake(proxy).await;
    stream
        .write_all(&domain_request(0x01, "localhost", echo.port()))
        .await
        .unwrap();

    // localhost may resolve to ::1 first; the proxy moves on to 127.0.0.1
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(&head[..2], &[0x05, 0x00]);
    let addr_len = if head[3] == 0x04 { 16 } else { 4 };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await.unwrap();

    stream.write_all(b"over a name").await.unwrap();
    let mut buf = [0u8; 11];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"over a name");
}

#[tokio::test]
async fn test_unresolvable_host() {
    let proxy = start_proxy().await;

    let mut stream = handshake(proxy).await;
    stream
        .write_all(&domain_request(0x01, "nonexistent.invalid", 80))
        .await
        .unwrap();

    let reply = read_reply(&mut stream).await;
    assert_eq!(reply[1], 0x04);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_connection_refused() {
    let proxy = start_proxy().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    drop(listener);

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, target)).await.unwrap();

    let reply = read_reply(&mut stream).await;
    assert_eq!(reply[1], 0x05);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_bind_and_udp_associate_rejected() {
    let proxy = start_proxy().await;
    let requests = [
        request(0x02, "10.0.0.1:80".parse().unwrap()),
        request(0x02, "[::1]:80".parse().unwrap()),
        domain_request(0x02, "example.com", 443),
        request(0x03, "0.0.0.0:0".parse().unwrap()),
    ];

    for req in requests {
        let mut stream = handshake(proxy).await;
        stream.write_all(&req).await.unwrap();

        let reply = read_reply(&mut stream).await;
        assert_eq!(&reply[..4], &[0x05, 0x07, 0x00, 0x01]);
        assert_closed(&mut stream).await;
    }
}

#[tokio::test]
async fn test_nonzero_reserved_byte_rejected() {
    let proxy = start_proxy().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut req = request(0x01, listener.local_addr().unwrap());
    req[2] = 0xAB;

    let mut stream = handshake(proxy).await;
    stream.write_all(&req).await.unwrap();

    let reply = read_reply(&mut stream).await;
    assert_eq!(reply[1], 0x07);
    assert_closed(&mut stream).await;
    assert!(
        timeout(Duration::from_millis(100), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_relay_preserves_byte_stream() {
    let proxy = start_proxy().await;
    let echo = start_echo().await;

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, echo)).await.unwrap();
    let reply = read_reply(&mut stream).await;
    assert_eq!(reply[1], 0x00);

    // Large enough to fill socket buffers in both directions
    let payload: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
    let expected = payload.clone();

    let (mut rx, mut tx) = stream.into_split();
    let writer = tokio::spawn(async move {
        for chunk in payload.chunks(3001) {
            tx.write_all(chunk).await.unwrap();
        }
        tx
    });

    let mut received = vec![0u8; expected.len()];
    timeout(Duration::from_secs(30), rx.read_exact(&mut received))
        .await
        .expect("relay stalled")
        .unwrap();
    assert!(received == expected, "relayed bytes differ from sent bytes");

    let _tx = writer.await.unwrap();
}

#[tokio::test]
async fn test_upstream_close_closes_client() {
    let proxy = start_proxy().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, target)).await.unwrap();
    let (mut upstream, _) = listener.accept().await.unwrap();
    read_reply(&mut stream).await;

    upstream.write_all(b"bye").await.unwrap();
    drop(upstream);

    let mut buf = [0u8; 3];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"bye");
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let proxy = start_proxy().await;
    let echo = start_echo().await;

    // A client stuck mid-greeting must not hold up another
    let mut stalled = TcpStream::connect(proxy).await.unwrap();
    stalled.write_all(&[0x05]).await.unwrap();

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, echo)).await.unwrap();
    assert_eq!(read_reply(&mut stream).await[1], 0x00);

    stream.write_all(b"still served").await.unwrap();
    let mut buf = [0u8; 12];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"still served");
}

#[tokio::test]
async fn test_client_close_during_connect_gets_no_reply() {
    let proxy = start_proxy().await;
    let (_listener, _queued, target) = stalled_listener().await;

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, target)).await.unwrap();
    stream.write_all(b"early").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.shutdown().await.unwrap();

    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_too_much_early_data_closes_without_reply() {
    let proxy = start_proxy().await;
    let (_listener, _queued, target) = stalled_listener().await;

    let mut stream = handshake(proxy).await;
    stream.write_all(&request(0x01, target)).await.unwrap();

    let (mut rx, mut tx) = stream.into_split();
    tokio::spawn(async move {
        let _ = tx.write_all(&vec![0x42; 70 * 1024]).await;
        tx
    });

    let mut rest = Vec::new();
    let read = timeout(Duration::from_secs(5), rx.read_to_end(&mut rest))
        .await
        .expect("proxy did not close the connection");
    if read.is_ok() {
        assert!(rest.is_empty(), "unexpected bytes after close: {rest:?}");
    }
}
