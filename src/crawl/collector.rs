//! 文件结果收集器：在驱动线程上汇总文件路径，并决定抓取何时结束。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info};

use super::models::CompletionPolicy;
use super::queue::WorkQueue;

const TRACKED_POLL: Duration = Duration::from_millis(50);
const LOG_EVERY: usize = 1000;

pub(crate) fn collect(
    files: &WorkQueue<String>,
    policy: CompletionPolicy,
    in_flight: &AtomicUsize,
) -> Vec<String> {
    let mut collected = Vec::new();
    match policy {
        CompletionPolicy::Quiescence(idle) => loop {
            match files.recv_timeout(idle) {
                Ok(path) => push(&mut collected, path),
                Err(RecvTimeoutError::Timeout) => {
                    info!("{:?} 内没有新文件，结束收集", idle);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        },
        CompletionPolicy::Tracked => loop {
            match files.recv_timeout(TRACKED_POLL) {
                Ok(path) => push(&mut collected, path),
                Err(RecvTimeoutError::Timeout) => {
                    // 目录计数先归零，文件必然已全部入队
                    if in_flight.load(Ordering::SeqCst) == 0 && files.is_empty() {
                        debug!("所有目录已处理完毕");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        },
    }
    collected
}

fn push(collected: &mut Vec<String>, path: String) {
    collected.push(path);
    if collected.len() % LOG_EVERY == 0 {
        info!("已收集 {} 个文件", collected.len());
    }
}
