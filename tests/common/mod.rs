//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use content_filter_proxy::classifier::{ClassificationResult, Classifier, ClassifierAdapter, ClassifierError};
use content_filter_proxy::http::response::DEFAULT_BLOCKED_PAGE;
use content_filter_proxy::http::SyntheticResponses;
use content_filter_proxy::lifecycle::{ProxyState, Shutdown};
use content_filter_proxy::policy::{Blacklist, PolicyGate, SharedBlacklist};
use content_filter_proxy::render::BuiltinTemplates;
use content_filter_proxy::{Dispatcher, ProxyConfig, ProxyContext};

/// Start a mock upstream that answers every connection with `response`
/// after reading the request head, then closes.
pub async fn start_mock_upstream(response: impl Into<Bytes>) -> SocketAddr {
    start_recording_upstream(response).await.0
}

/// Like [`start_mock_upstream`], also handing out every request head it read.
pub async fn start_recording_upstream(response: impl Into<Bytes>) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let response = response.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let response = response.clone();
                    let heads = heads.clone();
                    tokio::spawn(async move {
                        let _ = heads.send(read_head(&mut socket).await);
                        let _ = socket.write_all(&response).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, received)
}

/// Start an upstream that reads the request, sends `prefix` and then goes
/// quiet while keeping the connection open.
pub async fn start_stalling_upstream(prefix: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            read_head(&mut socket).await;
            let _ = socket.write_all(prefix).await;
            held.push(socket);
        }
    });

    addr
}

/// A loopback port with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    reserved.local_addr().unwrap()
}

async fn read_head(socket: &mut TcpStream) -> Vec<u8> {
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
    seen
}

/// Returns the same scores for any non-empty token stream.
pub struct FixedClassifier {
    result: ClassificationResult,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(pairs: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            result: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// A proxy running on a loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: ProxyState,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub fn test_config(workers: usize) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.workers = workers;
    config.timeouts.upstream_connect_secs = 2;
    config.timeouts.upstream_read_secs = 2;
    config.timeouts.drain_secs = 1;
    config
}

/// Start a proxy with the given blacklist and classifier.
pub async fn start_proxy(config: ProxyConfig, blacklisted: &[&str], classifier: Arc<dyn Classifier>) -> TestProxy {
    let blacklist = Arc::new(SharedBlacklist::new(Blacklist::from_entries(blacklisted.iter().copied())));
    let gate = PolicyGate::new(blacklist, ClassifierAdapter::new(classifier), &config.policy);
    let responses = SyntheticResponses::new(Bytes::from_static(DEFAULT_BLOCKED_PAGE), Arc::new(BuiltinTemplates));
    let context = Arc::new(ProxyContext::new(gate, responses, &config));

    let state = ProxyState::new();
    let shutdown = Shutdown::new();
    let dispatcher = Dispatcher::new(context, &config, state.clone());
    let listener = dispatcher.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(dispatcher.run(listener, shutdown.subscribe()));

    wait_until(|| state.is_running()).await;
    TestProxy { addr, state, shutdown }
}

/// Send `request` through the proxy and read until it closes the connection.
pub async fn roundtrip(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    response
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
