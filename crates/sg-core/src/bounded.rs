//! Time-bounded calls into external collaborators.
//!
//! A [`BoundedWorker`] owns a handler on a dedicated thread. Each call sends
//! a tagged request and waits on the reply channel with `recv_timeout`.
//!
//! At most one request is ever queued. After a call times out, its request
//! stays in flight until the handler replies; calls made meanwhile fail at
//! once without enqueueing, so a slow handler never builds a backlog. The
//! late reply is discarded by the first call after it lands.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundedError {
    #[error("call did not complete within {millis}ms")]
    Elapsed { millis: u64 },
    #[error("worker thread is gone")]
    Disconnected,
}

struct Inbox<Resp> {
    replies: Receiver<(u64, Resp)>,
    /// Request that timed out and has not been answered yet.
    in_flight: Option<u64>,
}

impl<Resp> Inbox<Resp> {
    /// Drop replies that have landed; `false` while the handler is still busy.
    fn settle(&mut self) -> Result<bool, BoundedError> {
        while let Some(pending) = self.in_flight {
            match self.replies.try_recv() {
                Ok((id, _)) if id == pending => self.in_flight = None,
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Err(BoundedError::Disconnected),
            }
        }
        Ok(true)
    }
}

pub struct BoundedWorker<Req, Resp> {
    requests: Sender<(u64, Req)>,
    inbox: Mutex<Inbox<Resp>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl<Req, Resp> BoundedWorker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawn the worker thread. It exits once the worker is dropped.
    pub fn spawn<F>(thread_name: &str, timeout: Duration, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(Req) -> Resp + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<(u64, Req)>();
        let (resp_tx, resp_rx) = mpsc::channel::<(u64, Resp)>();

        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                while let Ok((id, req)) = req_rx.recv() {
                    if resp_tx.send((id, handler(req))).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests: req_tx,
            inbox: Mutex::new(Inbox {
                replies: resp_rx,
                in_flight: None,
            }),
            next_id: AtomicU64::new(0),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Send `req` and wait at most the configured timeout for its reply.
    ///
    /// Fails with [`BoundedError::Elapsed`] right away, without sending,
    /// while an earlier timed-out request is still being handled.
    pub fn call(&self, req: Req) -> Result<Resp, BoundedError> {
        let mut inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = BoundedError::Elapsed {
            millis: self.timeout_millis(),
        };
        if !inbox.settle()? {
            return Err(elapsed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.requests
            .send((id, req))
            .map_err(|_| BoundedError::Disconnected)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match inbox.replies.recv_timeout(remaining) {
                Ok((reply_id, resp)) if reply_id == id => return Ok(resp),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    inbox.in_flight = Some(id);
                    return Err(elapsed);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(BoundedError::Disconnected),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn fast_call_returns_value() {
        let worker = BoundedWorker::spawn("t-fast", Duration::from_millis(500), |x: u32| x * 2)
            .unwrap();
        assert_eq!(worker.call(21), Ok(42));
        assert_eq!(worker.call(5), Ok(10));
    }

    #[test]
    fn slow_call_times_out_and_late_reply_is_discarded() {
        let worker = BoundedWorker::spawn("t-slow", Duration::from_millis(50), |delay: u64| {
            std::thread::sleep(Duration::from_millis(delay));
            delay
        })
        .unwrap();

        assert_eq!(
            worker.call(200),
            Err(BoundedError::Elapsed { millis: 50 })
        );
        // Let the stale reply land, then make sure the next call skips it.
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(worker.call(0), Ok(0));
    }

    #[test]
    fn busy_worker_rejects_without_queueing() {
        let handled = Arc::new(AtomicUsize::new(0));
        let worker = {
            let handled = Arc::clone(&handled);
            BoundedWorker::spawn("t-busy", Duration::from_millis(200), move |delay: u64| {
                handled.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(delay));
                delay
            })
            .unwrap()
        };

        assert!(worker.call(600).is_err());
        // The first request is still running: fail fast, enqueue nothing.
        let started = Instant::now();
        for _ in 0..10 {
            assert_eq!(worker.call(0), Err(BoundedError::Elapsed { millis: 200 }));
        }
        assert!(started.elapsed() < Duration::from_millis(150));

        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(worker.call(0), Ok(0));
        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }
}
