#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Spawn a scripted server on a random port. The handler owns each
/// accepted connection. Returns the port and a counter of accepted
/// connections (for asserting reuse).
pub async fn start_test_server<F>(handler: F) -> (u16, Arc<AtomicUsize>)
where
    F: Fn(TcpStream) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handler(socket));
        }
    });

    (port, connections)
}

/// Read one full request (head plus any Content-Length body) from the
/// socket. Returns `None` when the peer closes without sending one.
///
/// The scan is deliberately loose: evasion tests send request lines no
/// strict parser would accept.
pub async fn read_request(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(total) = request_len(&received) {
            if received.len() >= total {
                return Some(received);
            }
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => {
                return if received.is_empty() {
                    None
                } else {
                    Some(received)
                };
            }
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
}

/// Total request length once the head is complete: head bytes plus the
/// declared Content-Length.
fn request_len(bytes: &[u8]) -> Option<usize> {
    let head_end = bytes.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let head = String::from_utf8_lossy(&bytes[..head_end]);
    let mut content_length = 0usize;
    for line in head.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    Some(head_end + content_length)
}
