use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::loader::TileLoader;
use crate::request::{TileFailure, TileRequest, TileResponse};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("no tokio runtime available")]
    NoRuntime,
}

#[derive(Debug, Clone)]
pub struct HttpLoaderConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpLoaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: concat!("bizmap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Tile loader backed by reqwest.
///
/// Each request is a tokio task on `runtime`; results travel back through an
/// unbounded channel drained by `poll`.
pub struct HttpTileLoader {
    client: reqwest::Client,
    runtime: Handle,
    tx: mpsc::UnboundedSender<TileResponse>,
    rx: mpsc::UnboundedReceiver<TileResponse>,
    tasks: Vec<JoinHandle<()>>,
}

impl HttpTileLoader {
    pub fn new(runtime: Handle, config: HttpLoaderConfig) -> Result<Self, LoaderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            client,
            runtime,
            tx,
            rx,
            tasks: Vec::new(),
        })
    }

    /// Loader on the runtime of the calling context.
    pub fn current(config: HttpLoaderConfig) -> Result<Self, LoaderError> {
        let runtime = Handle::try_current().map_err(|_| LoaderError::NoRuntime)?;
        Self::new(runtime, config)
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, TileFailure> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| TileFailure::Transport(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TileFailure::Status(status.as_u16()));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TileFailure::Transport(e.to_string()))?;
    Ok(bytes.to_vec())
}

impl TileLoader for HttpTileLoader {
    fn request(&mut self, request: TileRequest) {
        self.tasks.retain(|t| !t.is_finished());
        let client = self.client.clone();
        let tx = self.tx.clone();
        debug!(id = request.id.0, attempt = request.attempt, url = %request.url, "tile request");
        self.tasks.push(self.runtime.spawn(async move {
            let outcome = fetch(&client, &request.url).await;
            if let Err(e) = &outcome {
                warn!(id = request.id.0, error = %e, "tile request failed");
            }
            // The receiver only goes away with the loader.
            let _ = tx.send(TileResponse {
                id: request.id,
                outcome,
            });
        }));
    }

    fn poll(&mut self) -> Vec<TileResponse> {
        let mut out = Vec::new();
        while let Ok(resp) = self.rx.try_recv() {
            out.push(resp);
        }
        out
    }

    fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for HttpTileLoader {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
