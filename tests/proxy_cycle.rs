//! End-to-end proxy cycles over real sockets.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{
    refused_addr, roundtrip, start_mock_upstream, start_proxy, start_recording_upstream, start_stalling_upstream,
    test_config, FixedClassifier,
};
use content_filter_proxy::http::response::DEFAULT_BLOCKED_PAGE;
use content_filter_proxy::http::HttpMessage;

const HTML_PAGE: &[u8] = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n<html><body><p>Откровенные материалы для взрослых</p></body></html>".as_bytes();

const JSON_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 27\r\nX-Upstream: mock\r\n\r\n{\"text\":\"plain json body\"}\n";

#[tokio::test]
async fn blacklisted_host_gets_blocked_page() {
    let classifier = FixedClassifier::new(&[]);
    let proxy = start_proxy(test_config(4), &["blocked.example"], classifier.clone()).await;

    let response = roundtrip(
        proxy.addr,
        b"GET http://blocked.example/ HTTP/1.1\r\nHost: blocked.example\r\n\r\n",
    )
    .await;

    let message = HttpMessage::parse(&response).unwrap();
    assert_eq!(message.status(), Some(200));
    assert_eq!(message.headers.get("Transfer-Encoding"), Some("identity"));
    assert_eq!(&message.body[..], DEFAULT_BLOCKED_PAGE);
    assert_eq!(classifier.calls(), 0);
    proxy.stop();
}

#[tokio::test]
async fn subdomain_of_blacklisted_host_is_blocked() {
    let proxy = start_proxy(test_config(4), &["blocked.example"], FixedClassifier::new(&[])).await;

    let response = roundtrip(proxy.addr, b"GET / HTTP/1.1\r\nHost: www.blocked.example\r\n\r\n").await;
    let message = HttpMessage::parse(&response).unwrap();
    assert_eq!(&message.body[..], DEFAULT_BLOCKED_PAGE);
    proxy.stop();
}

#[tokio::test]
async fn adult_page_is_replaced_by_report() {
    let upstream = start_mock_upstream(HTML_PAGE).await;
    let classifier = FixedClassifier::new(&[("adult", 0.92), ("news", 0.05)]);
    let proxy = start_proxy(test_config(4), &["blocked.example"], classifier.clone()).await;

    let request = format!("GET http://{}/page HTTP/1.1\r\nHost: {}\r\n\r\n", upstream, upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;

    let message = HttpMessage::parse(&response).unwrap();
    assert_eq!(message.status(), Some(200));
    assert_eq!(message.headers.get("transfer-encoding"), Some("identity"));
    let page = String::from_utf8(message.body.to_vec()).unwrap();
    assert!(page.contains("adult"));
    assert!(page.contains("0.92"));
    assert!(page.find("adult").unwrap() < page.find("news").unwrap());
    assert_eq!(classifier.calls(), 1);
    proxy.stop();
}

#[tokio::test]
async fn page_below_threshold_is_forwarded() {
    let upstream = start_mock_upstream(HTML_PAGE).await;
    let classifier = FixedClassifier::new(&[("adult", 0.3), ("news", 0.7)]);
    let proxy = start_proxy(test_config(4), &[], classifier.clone()).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;

    assert_eq!(response, HTML_PAGE);
    assert_eq!(classifier.calls(), 1);
    proxy.stop();
}

#[tokio::test]
async fn non_html_is_forwarded_byte_for_byte() {
    let upstream = start_mock_upstream(JSON_RESPONSE).await;
    let classifier = FixedClassifier::new(&[("adult", 0.99)]);
    let proxy = start_proxy(test_config(4), &[], classifier.clone()).await;

    let request = format!("GET http://{}/api HTTP/1.1\r\nAccept: */*\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;

    assert_eq!(response, JSON_RESPONSE);
    assert_eq!(classifier.calls(), 0);
    proxy.stop();
}

#[tokio::test]
async fn refused_upstream_frees_the_worker() {
    let dead = refused_addr().await;
    let live = start_mock_upstream(JSON_RESPONSE).await;
    let proxy = start_proxy(test_config(1), &[], FixedClassifier::new(&[])).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", dead);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert!(response.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"));

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", live);
    let next = tokio::time::timeout(Duration::from_secs(3), roundtrip(proxy.addr, request.as_bytes()))
        .await
        .expect("second connection was not served");
    assert_eq!(next, JSON_RESPONSE);
    proxy.stop();
}

#[tokio::test]
async fn malformed_request_gets_bad_request() {
    let proxy = start_proxy(test_config(2), &[], FixedClassifier::new(&[])).await;

    let response = roundtrip(proxy.addr, b"this is not http\r\n\r\n").await;
    assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    assert!(proxy.state.is_running());
    proxy.stop();
}

#[tokio::test]
async fn connect_tunnels_bytes() {
    let echo = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let echo_addr = echo.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = echo.accept().await.unwrap();
        let (mut reader, mut writer) = socket.split();
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
    });

    let proxy = start_proxy(test_config(2), &[], Arc::new(content_filter_proxy::classifier::DisabledClassifier)).await;

    let mut client = tokio::net::TcpStream::connect(proxy.addr).await.unwrap();
    let connect = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", echo_addr, echo_addr);
    client.write_all(connect.as_bytes()).await.unwrap();

    let mut established = [0u8; 39];
    client.read_exact(&mut established).await.unwrap();
    assert_eq!(&established[..], b"HTTP/1.1 200 Connection Established\r\n\r\n");

    client.write_all(b"opaque bytes").await.unwrap();
    let mut echoed = [0u8; 12];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"opaque bytes");
    proxy.stop();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let proxy = start_proxy(test_config(2), &[], FixedClassifier::new(&[])).await;
    proxy.stop();
    common::wait_until(|| !proxy.state.is_running()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let refused = tokio::net::TcpStream::connect(proxy.addr).await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn absolute_form_decides_the_upstream_host() {
    let (upstream, mut heads) = start_recording_upstream(JSON_RESPONSE).await;
    let proxy = start_proxy(test_config(2), &["blocked.example"], FixedClassifier::new(&[])).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\nHost: blocked.example\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert_eq!(response, JSON_RESPONSE);

    let head = String::from_utf8(heads.recv().await.unwrap()).unwrap();
    let hosts: Vec<&str> = head
        .lines()
        .filter_map(|line| line.strip_prefix("Host: "))
        .collect();
    assert_eq!(hosts, [upstream.to_string()]);
    assert!(!head.contains("blocked.example"));
    proxy.stop();
}

#[tokio::test]
async fn binary_body_over_the_buffer_limit_is_relayed() {
    let mut wire = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 100000\r\n\r\n".to_vec();
    wire.extend((0..100_000u32).map(|i| (i % 251) as u8));
    let upstream = start_mock_upstream(wire.clone()).await;

    let mut config = test_config(2);
    config.limits.max_body_bytes = 64;
    let proxy = start_proxy(config, &[], FixedClassifier::new(&[("adult", 0.99)])).await;

    let request = format!("GET http://{}/file.bin HTTP/1.1\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert_eq!(response.len(), wire.len());
    assert!(response == wire);
    proxy.stop();
}

#[tokio::test]
async fn html_over_the_buffer_limit_is_relayed_unclassified() {
    let upstream = start_mock_upstream(HTML_PAGE).await;
    let classifier = FixedClassifier::new(&[("adult", 0.99)]);

    let mut config = test_config(2);
    config.limits.max_body_bytes = 64;
    let proxy = start_proxy(config, &[], classifier.clone()).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert_eq!(response, HTML_PAGE);
    assert_eq!(classifier.calls(), 0);
    proxy.stop();
}

#[tokio::test]
async fn chunked_html_is_classified() {
    let upstream = start_mock_upstream(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n\
         9\r\n<p>Взр\r\n19\r\nослый текст</p>\r\n0\r\n\r\n"
            .as_bytes(),
    )
    .await;
    let classifier = FixedClassifier::new(&[("adult", 0.95)]);
    let proxy = start_proxy(test_config(2), &[], classifier.clone()).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;

    let message = HttpMessage::parse(&response).unwrap();
    assert_eq!(message.headers.get("transfer-encoding"), Some("identity"));
    assert!(String::from_utf8_lossy(&message.body).contains("adult"));
    assert_eq!(classifier.calls(), 1);
    proxy.stop();
}

#[tokio::test]
async fn garbled_upstream_gets_bad_gateway() {
    let upstream = start_mock_upstream(&b"SSH-2.0-OpenSSH_9.6\r\n\r\n"[..]).await;
    let proxy = start_proxy(test_config(2), &[], FixedClassifier::new(&[])).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", upstream);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert!(response.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"));
    proxy.stop();
}

#[tokio::test]
async fn stalled_client_times_out_and_frees_the_worker() {
    let mut config = test_config(1);
    config.timeouts.client_read_secs = 1;
    let proxy = start_proxy(config, &["blocked.example"], FixedClassifier::new(&[])).await;

    let mut stalled = tokio::net::TcpStream::connect(proxy.addr).await.unwrap();
    stalled.write_all(b"GET http://blocked.example/ HTTP/1.1\r\n").await.unwrap();

    let queued = tokio::spawn(roundtrip(
        proxy.addr,
        b"GET http://blocked.example/ HTTP/1.1\r\nHost: blocked.example\r\n\r\n",
    ));

    let started = Instant::now();
    let mut leftover = Vec::new();
    tokio::time::timeout(Duration::from_secs(3), stalled.read_to_end(&mut leftover))
        .await
        .expect("stalled client was never disconnected")
        .unwrap();
    assert!(leftover.is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));

    let served = queued.await.unwrap();
    let message = HttpMessage::parse(&served).unwrap();
    assert_eq!(&message.body[..], DEFAULT_BLOCKED_PAGE);
    proxy.stop();
}

#[tokio::test]
async fn stalled_upstream_gets_gateway_timeout() {
    let silent = start_stalling_upstream(b"").await;
    let mut config = test_config(1);
    config.timeouts.upstream_read_secs = 1;
    let proxy = start_proxy(config, &["blocked.example"], FixedClassifier::new(&[])).await;

    let started = Instant::now();
    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", silent);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert!(response.starts_with(b"HTTP/1.1 504 Gateway Timeout\r\n"));
    assert!(started.elapsed() < Duration::from_secs(3));

    let next = roundtrip(proxy.addr, b"GET http://blocked.example/ HTTP/1.1\r\n\r\n").await;
    assert_eq!(&HttpMessage::parse(&next).unwrap().body[..], DEFAULT_BLOCKED_PAGE);
    proxy.stop();
}

#[tokio::test]
async fn upstream_stalling_mid_body_is_cut_off() {
    const PARTIAL: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 100\r\n\r\nfirst part";
    let stalling = start_stalling_upstream(PARTIAL).await;
    let mut config = test_config(1);
    config.timeouts.upstream_read_secs = 1;
    let proxy = start_proxy(config, &[], FixedClassifier::new(&[])).await;

    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", stalling);
    let response = roundtrip(proxy.addr, request.as_bytes()).await;
    assert_eq!(response, PARTIAL);
    proxy.stop();
}
