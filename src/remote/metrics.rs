//! 后台指标轮询：独立线程定期请求 `api/v1/metrics`，可随时停止。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as channel;
use tracing::{Span, debug, info, info_span, warn};

use super::client::StoreClient;

pub const METRICS_API: &str = "api/v1/metrics";

pub struct MetricsPoller {
    stop_tx: Option<channel::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    polls: Arc<AtomicU64>,
}

impl MetricsPoller {
    pub fn spawn(
        client: Arc<dyn StoreClient>,
        interval: Duration,
        parent: &Span,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let polls = Arc::new(AtomicU64::new(0));
        let span = info_span!(parent: parent, "metrics_poller");
        let counter = Arc::clone(&polls);

        let handle = thread::Builder::new()
            .name("metrics-poller".to_string())
            .spawn(move || {
                let _enter = span.enter();
                info!("开始轮询 {}，间隔 {:?}", METRICS_API, interval);
                loop {
                    match client.get_bytes(METRICS_API) {
                        Ok(body) => debug!("指标响应 {} 字节", body.len()),
                        Err(err) => warn!("轮询 {} 失败: {}", METRICS_API, err),
                    }
                    counter.fetch_add(1, Ordering::Relaxed);

                    match stop_rx.recv_timeout(interval) {
                        Err(channel::RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("指标轮询已停止");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            polls,
        })
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.handle.take() {
            let _ = h.join();
            debug!("指标轮询共请求 {} 次", self.polls());
        }
    }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
