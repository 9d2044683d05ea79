//! Upload sink: the endpoint the upload phase POSTs to. It reads the body,
//! counts it and throws it away.

use anyhow::Result;
use axum::{body::Body, http::StatusCode, routing::post, Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
};
use tracing::{debug, info, warn};

pub const UPLOAD_PATH: &str = "/api/speedtest/upload";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub received: u64,
}

pub fn router() -> Router {
    Router::new().route(UPLOAD_PATH, post(upload_handler))
}

async fn upload_handler(body: Body) -> Result<Json<UploadReceipt>, StatusCode> {
    let mut stream = body.into_data_stream();
    let mut received = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            debug!(error = %e, received, "upload body aborted");
            StatusCode::BAD_REQUEST
        })?;
        received += chunk.len() as u64;
    }

    Ok(Json(UploadReceipt { received }))
}

pub async fn serve(bind: SocketAddr) -> Result<()> {
    info!("Binding to {bind}");
    let listener = TcpListener::bind(bind).await?;
    info!("Upload sink listening on {}{}", listener.local_addr()?, UPLOAD_PATH);

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Upload sink shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Serves the sink on an ephemeral localhost port for the lifetime of the
/// test runtime.
#[cfg(test)]
pub(crate) async fn spawn_ephemeral() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discards_and_counts_body() {
        let addr = spawn_ephemeral().await;
        let payload = vec![0xA5u8; 3 * 1024 * 1024 + 17];

        let response = reqwest::Client::new()
            .post(format!("http://{addr}{UPLOAD_PATH}"))
            .body(payload.clone())
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        let receipt: UploadReceipt = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
        assert_eq!(receipt.received, payload.len() as u64);
    }

    #[tokio::test]
    async fn empty_body_is_accepted() {
        let addr = spawn_ephemeral().await;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{UPLOAD_PATH}"))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let addr = spawn_ephemeral().await;
        let response = reqwest::get(format!("http://{addr}{UPLOAD_PATH}")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }
}
