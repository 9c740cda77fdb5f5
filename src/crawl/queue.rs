//! 带关闭标记的有界工作队列。
//!
//! 队列满时 `submit` 阻塞（背压），关闭后立即以 `QueueClosed` 退回条目；
//! 关闭前已入队的条目仍可由 `next` 取出，取空后返回 `None`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

#[derive(Debug, PartialEq, Eq)]
pub enum TrySubmitError<T> {
    Full(T),
    Closed(T),
}

pub struct WorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 阻塞直到入队成功或队列被关闭。
    pub fn submit(&self, item: T) -> Result<(), QueueClosed<T>> {
        let mut item = item;
        loop {
            if self.is_closed() {
                return Err(QueueClosed(item));
            }
            match self.tx.send_timeout(item, POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => return Err(QueueClosed(back)),
            }
        }
    }

    pub fn try_submit(&self, item: T) -> Result<(), TrySubmitError<T>> {
        if self.is_closed() {
            return Err(TrySubmitError::Closed(item));
        }
        self.tx.try_send(item).map_err(|e| match e {
            channel::TrySendError::Full(v) => TrySubmitError::Full(v),
            channel::TrySendError::Disconnected(v) => TrySubmitError::Closed(v),
        })
    }

    /// 取下一个条目；队列为空时等待，关闭且取空后返回 `None`。
    pub fn next(&self) -> Option<T> {
        loop {
            match self.rx.recv_timeout(POLL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_closed() && self.rx.is_empty() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// 取走当前缓冲的全部条目，不等待。
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
