//! Admin status surface.

mod common;

use tokio::net::TcpListener;

use common::{start_proxy, test_config, wait_until, FixedClassifier};
use content_filter_proxy::admin::serve_admin;
use content_filter_proxy::lifecycle::{ProxyState, Shutdown};

async fn get(url: &str) -> reqwest::Result<reqwest::Response> {
    reqwest::Client::builder().no_proxy().build()?.get(url).send().await
}

async fn start_admin(state: &ProxyState) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/status", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    tokio::spawn(serve_admin(listener, state.status_handle(), shutdown.subscribe()));
    (url, shutdown)
}

#[tokio::test]
async fn status_reports_false_before_dispatch() {
    let state = ProxyState::new();
    let (url, shutdown) = start_admin(&state).await;

    let res = get(&url).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(res.text().await.unwrap(), "false");
    shutdown.trigger();
}

#[tokio::test]
async fn status_follows_the_dispatcher() {
    let proxy = start_proxy(test_config(2), &[], FixedClassifier::new(&[])).await;
    let (url, admin_shutdown) = start_admin(&proxy.state).await;

    assert_eq!(get(&url).await.unwrap().text().await.unwrap(), "true");

    proxy.stop();
    wait_until(|| !proxy.state.is_running()).await;
    assert_eq!(get(&url).await.unwrap().text().await.unwrap(), "false");
    admin_shutdown.trigger();
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let state = ProxyState::new();
    let (url, shutdown) = start_admin(&state).await;

    let res = get(&url.replace("/status", "/admin/backends")).await.unwrap();
    assert_eq!(res.status(), 404);
    shutdown.trigger();
}
