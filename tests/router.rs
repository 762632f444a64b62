//! End-to-end routing over real sockets: echo target, HTTP CONNECT relays.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use relaychain::{Config, Error, Network, Registry};

async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut s, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = s.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Minimal HTTP CONNECT proxy; requires `Proxy-Authorization` when `auth`
/// is set (base64 of `user:pass`).
async fn connect_proxy(auth: Option<&'static str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((s, _)) = listener.accept().await {
            tokio::spawn(handle_connect(s, auth));
        }
    });
    addr
}

async fn handle_connect(stream: TcpStream, auth: Option<&'static str>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return;
    }
    let mut authorized = auth.is_none();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return;
        }
        if line == "\r\n" {
            break;
        }
        if let (Some(expected), Some(value)) = (auth, line.strip_prefix("Proxy-Authorization: Basic ")) {
            authorized |= value.trim() == expected;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (Some("CONNECT"), Some(target)) = (parts.next(), parts.next()) else {
        let _ = reader.get_mut().write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        return;
    };
    if !authorized {
        let _ = reader
            .get_mut()
            .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
            .await;
        return;
    }
    let Ok(mut upstream) = TcpStream::connect(target).await else {
        let _ = reader.get_mut().write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
        return;
    };
    if reader
        .get_mut()
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await
        .is_err()
    {
        return;
    }
    let _ = tokio::io::copy_bidirectional(&mut reader, &mut upstream).await;
}

async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn ping(router: &relaychain::Router, target: SocketAddr) {
    let mut stream = router.dial(Network::Tcp, &target.to_string()).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_two_hop_http_chain() {
    let target = echo_server().await;
    let first = connect_proxy(None).await;
    // "user:pass"
    let second = connect_proxy(Some("dXNlcjpwYXNz")).await;

    let config = Config::from_json(&format!(
        r#"{{
            "router": {{ "chains": ["c"] }},
            "chains": [{{
                "name": "c",
                "hops": [
                    {{ "nodes": [{{ "name": "first", "addr": "{first}" }}] }},
                    {{ "nodes": [{{
                        "name": "second",
                        "addr": "{second}",
                        "connector": {{ "type": "http", "auth": {{ "username": "user", "password": "pass" }} }}
                    }}] }}
                ]
            }}]
        }}"#
    ))
    .unwrap();
    let router = config.build_router(&Registry::with_defaults()).unwrap();

    ping(&router, target).await;
}

#[tokio::test]
async fn test_wrong_credentials_fail() {
    let target = echo_server().await;
    let proxy = connect_proxy(Some("dXNlcjpwYXNz")).await;

    let config = Config::from_json(&format!(
        r#"{{
            "router": {{ "chains": ["c"], "retries": 1 }},
            "chains": [{{
                "name": "c",
                "hops": [{{ "nodes": [{{
                    "addr": "{proxy}",
                    "connector": {{ "type": "http", "auth": {{ "username": "user", "password": "nope" }} }}
                }}] }}]
            }}]
        }}"#
    ))
    .unwrap();
    let router = config.build_router(&Registry::with_defaults()).unwrap();

    assert!(router.dial(Network::Tcp, &target.to_string()).await.is_err());
}

#[tokio::test]
async fn test_failover_to_healthy_node() {
    let target = echo_server().await;
    let dead = dead_addr().await;
    let live = connect_proxy(None).await;

    let config = Config::from_json(&format!(
        r#"{{
            "router": {{ "chains": ["c"], "retries": 1 }},
            "chains": [{{
                "name": "c",
                "hops": [{{
                    "selector": {{ "strategy": "fifo", "max_fails": 1, "fail_timeout_secs": 30 }},
                    "nodes": [
                        {{ "name": "dead", "addr": "{dead}" }},
                        {{ "name": "live", "addr": "{live}" }}
                    ]
                }}]
            }}]
        }}"#
    ))
    .unwrap();
    let router = config.build_router(&Registry::with_defaults()).unwrap();

    ping(&router, target).await;

    let chain = router.options().chain.clone().unwrap();
    let route = chain.route(Network::Tcp, &target.to_string());
    assert_eq!(route.nodes()[0].name, "live");
}

#[tokio::test]
async fn test_bypassed_destination_goes_direct() {
    let target = echo_server().await;
    let dead = dead_addr().await;

    let config = Config::from_json(&format!(
        r#"{{
            "router": {{ "chains": ["c"] }},
            "chains": [{{
                "name": "c",
                "hops": [{{
                    "bypass": ["127.0.0.0/8"],
                    "nodes": [{{ "addr": "{dead}" }}]
                }}]
            }}]
        }}"#
    ))
    .unwrap();
    let router = config.build_router(&Registry::with_defaults()).unwrap();

    ping(&router, target).await;
}

#[tokio::test]
async fn test_static_hosts() {
    let target = echo_server().await;
    let config =
        Config::from_json(r#"{ "hosts": { "echo.test": ["127.0.0.1"] }, "resolver": "system" }"#)
            .unwrap();
    let router = config.build_router(&Registry::with_defaults()).unwrap();

    let mut stream = router
        .dial(Network::Tcp, &format!("echo.test:{}", target.port()))
        .await
        .unwrap();
    stream.write_all(b"hosts").await.unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hosts");

    let err = router
        .dial(Network::Tcp, "does-not-exist.invalid:80")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Resolve(_)));
}
