//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pac_gateway::config::GatewayConfig;
use pac_gateway::lifecycle::{self, Running, Shutdown};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads up to and including the blank line ending a request or response
/// head.
pub async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Start a mock origin that answers every request with `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut socket).await;
                let _ = socket.write_all(ok_response(body).as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a TCP server that echoes everything back.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Start a mock HTTP proxy. Plain requests get `body`; CONNECT gets
/// `connect_reply` followed by an echo of the tunnel.
pub async fn start_mock_proxy(body: &'static str, connect_reply: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                if head.starts_with("CONNECT ") {
                    if socket.write_all(connect_reply.as_bytes()).await.is_err() {
                        return;
                    }
                    let (mut reader, mut writer) = socket.into_split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                } else {
                    let _ = socket.write_all(ok_response(body).as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub rules: NamedTempFile,
    pub shutdown: Shutdown,
    pub running: Running,
}

impl TestGateway {
    pub async fn start(rules: &str, refresh_secs: u64) -> Self {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(rules.as_bytes()).unwrap();

        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.rules.origin = file.path().to_str().unwrap().to_string();
        config.rules.refresh_secs = refresh_secs;
        config.timeouts.dial_secs = 2;
        config.timeouts.shutdown_grace_secs = 1;

        let shutdown = Shutdown::new();
        let running = lifecycle::start(&config, &shutdown).await.unwrap();
        Self {
            addr: running.local_addr,
            rules: file,
            shutdown,
            running,
        }
    }

    /// Replaces the rule document on disk.
    pub fn rewrite_rules(&self, rules: &str) {
        std::fs::write(self.rules.path(), rules).unwrap();
    }

    /// A client that sends every request through the gateway.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(format!("http://{}", self.addr)).unwrap())
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    /// Opens a raw connection to the gateway and sends a CONNECT for `target`.
    pub async fn connect(&self, target: &str) -> (TcpStream, String) {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let head = read_head(&mut stream).await;
        (stream, head)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.running.wait().await;
    }
}

/// Start a mock origin that reports each request head it receives.
pub async fn start_recording_backend() -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = tx.send(head);
                let _ = socket.write_all(ok_response("recorded").as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, rx)
}

/// Start a server that answers every request with the literal `response`
/// and counts the connections it served.
pub async fn start_raw_server(response: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_head(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, hits)
}

/// Start a SOCKS5 server (no authentication, CONNECT only).
pub async fn start_socks5_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = serve_socks5(socket).await;
            });
        }
    });
    addr
}

async fn serve_socks5(mut client: TcpStream) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    client.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    client.read_exact(&mut methods).await?;
    client.write_all(&[0x05, 0x00]).await?;

    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        0x04 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            format!("[{}]", Ipv6Addr::from(ip))
        }
        _ => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            client.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;
    let target = format!("{host}:{}", u16::from_be_bytes(port));

    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(e) => {
            client.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            return Err(e);
        }
    };
    client.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}

/// Reads one response with a `Content-Length` body off a raw connection.
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> (String, String) {
    let head = read_head(stream).await;
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    (head, String::from_utf8_lossy(&body).into_owned())
}
