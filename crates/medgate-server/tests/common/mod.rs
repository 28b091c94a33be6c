#![allow(dead_code)]

use medgate_server::config::PATIENT_SERVICE;
use medgate_server::{AppConfig, AppState, build_app, serve};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestGateway {
    pub base: String,
    pub addr: std::net::SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Signals shutdown and waits for in-flight requests to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.expect("server task");
        }
    }
}

/// Default configuration with the patient service pointed at `backend`.
pub fn config_for(backend: &str) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.services
        .get_mut(PATIENT_SERVICE)
        .expect("default service")
        .url = backend.to_string();
    cfg
}

/// Base URL of a local port with nothing listening on it.
pub async fn unreachable_backend() -> String {
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub async fn start_gateway(cfg: AppConfig) -> TestGateway {
    let state = AppState::from_config(cfg).expect("build state");
    start_with_state(state).await
}

pub async fn start_with_state(state: AppState) -> TestGateway {
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = serve(listener, build_app(state), async move {
            let _ = rx.await;
        })
        .await;
    });

    TestGateway {
        base: format!("http://{addr}"),
        addr,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}
