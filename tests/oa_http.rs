use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::Router;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use guideline_stager::domain::PmcId;
use guideline_stager::error::StagerError;
use guideline_stager::oa::{HttpSettings, OaClient, OaHttpClient, find_archive_link};

const PACKAGE: &[u8] = b"\x1f\x8b\x08\x00package-bytes";

/// Loopback server running on its own thread so the blocking client never
/// sits inside an async runtime.
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn new(router: Router) -> Self {
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        shutdown_rx.await.ok();
                    })
                    .await
                    .unwrap();
            });
        });
        let addr = addr_rx.recv().unwrap();
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn oa_service(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("id").map(String::as_str) {
        Some("PMC1") => (
            StatusCode::OK,
            r#"<OA><records><record id="PMC1"><link format="tgz" href="ftp://ftp.ncbi.nlm.nih.gov/pub/pmc/oa_package/00/01/PMC1.tar.gz"/></record></records></OA>"#,
        )
            .into_response(),
        Some("PMC2") => (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response(),
        Some("PMC3") => StatusCode::NO_CONTENT.into_response(),
        _ => (StatusCode::BAD_REQUEST, "bad id").into_response(),
    }
}

fn server() -> TestServer {
    let router = Router::new()
        .route("/oa.fcgi", get(oa_service))
        .route("/pkg/PMC1.tar.gz", get(|| async { PACKAGE }));
    TestServer::new(router)
}

fn client_for(endpoint: String) -> OaHttpClient {
    OaHttpClient::new(&HttpSettings {
        endpoint,
        timeout: Duration::from_secs(5),
        max_retries: 0,
    })
    .unwrap()
}

fn pmc(value: &str) -> PmcId {
    value.parse().unwrap()
}

#[test]
fn metadata_ok_returns_raw_body() {
    let server = server();
    let client = client_for(server.url("/oa.fcgi"));

    let body = client.fetch_metadata(&pmc("PMC1")).unwrap();
    let xml = String::from_utf8(body).unwrap();

    assert_eq!(
        find_archive_link(&xml).as_deref(),
        Some("ftp://ftp.ncbi.nlm.nih.gov/pub/pmc/oa_package/00/01/PMC1.tar.gz")
    );
}

#[test]
fn metadata_error_status_is_reported() {
    let server = server();
    let client = client_for(server.url("/oa.fcgi"));

    let err = client.fetch_metadata(&pmc("PMC2")).unwrap_err();

    assert_eq!(err.status_code(), Some(503));
    assert_matches!(err, StagerError::MetadataStatus { status: 503, message } if message == "try later");
}

#[test]
fn metadata_requires_exactly_200() {
    let server = server();
    let client = client_for(server.url("/oa.fcgi"));

    let err = client.fetch_metadata(&pmc("PMC3")).unwrap_err();

    assert_matches!(err, StagerError::MetadataStatus { status: 204, .. });
}

#[test]
fn unreachable_service_has_no_status() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let client = client_for(format!("http://{addr}/oa.fcgi"));

    let err = client.fetch_metadata(&pmc("PMC1")).unwrap_err();

    assert_eq!(err.status_code(), None);
    assert_matches!(err, StagerError::MetadataHttp(_));
}

#[test]
fn archive_is_streamed_to_destination() {
    let server = server();
    let client = client_for(server.url("/oa.fcgi"));
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("PMC1.tar.gz");

    client
        .download_archive(&server.url("/pkg/PMC1.tar.gz"), &destination)
        .unwrap();

    assert_eq!(fs::read(&destination).unwrap(), PACKAGE);
}

#[test]
fn missing_archive_is_a_status_error() {
    let server = server();
    let client = client_for(server.url("/oa.fcgi"));
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("PMC9.tar.gz");

    let err = client
        .download_archive(&server.url("/pkg/PMC9.tar.gz"), &destination)
        .unwrap_err();

    assert_matches!(err, StagerError::ArchiveStatus { status: 404, .. });
    assert!(!destination.exists());
}
