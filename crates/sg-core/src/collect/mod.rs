//! Samples providers.
//!
//! A provider yields one snapshot of live processes per call. Omitting a pid
//! that was present before means the process exited.

pub mod procfs;

pub use procfs::ProcfsProvider;

use sg_common::RawSample;
use std::time::Duration;
use thiserror::Error;

use crate::bounded::{BoundedError, BoundedWorker};

/// Errors from sample acquisition.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider timed out after {millis}ms")]
    Timeout { millis: u64 },
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("provider failed: {0}")]
    Failed(String),
}

impl From<ProviderError> for sg_common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout { millis } => sg_common::Error::ProviderTimeout { millis },
            other => sg_common::Error::Provider(other.to_string()),
        }
    }
}

/// Source of per-tick process snapshots.
pub trait SamplesProvider: Send {
    fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError>;

    fn name(&self) -> &'static str {
        "provider"
    }
}

impl<P: SamplesProvider + ?Sized> SamplesProvider for Box<P> {
    fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
        (**self).collect()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

type CollectResult = Result<Vec<RawSample>, ProviderError>;

/// Runs another provider on a worker thread and bounds each call.
///
/// A call that overruns returns [`ProviderError::Timeout`]; its late result
/// is dropped.
pub struct TimedProvider {
    name: &'static str,
    worker: BoundedWorker<(), CollectResult>,
}

impl TimedProvider {
    pub fn new<P>(mut provider: P, timeout: Duration) -> std::io::Result<Self>
    where
        P: SamplesProvider + 'static,
    {
        let name = provider.name();
        let worker = BoundedWorker::spawn("sg-provider", timeout, move |()| provider.collect())?;
        Ok(Self { name, worker })
    }
}

impl SamplesProvider for TimedProvider {
    fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
        match self.worker.call(()) {
            Ok(result) => result,
            Err(BoundedError::Elapsed { millis }) => Err(ProviderError::Timeout { millis }),
            Err(BoundedError::Disconnected) => Err(ProviderError::Failed(
                "provider worker thread exited".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct Sleepy(u64);

    impl SamplesProvider for Sleepy {
        fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
            std::thread::sleep(Duration::from_millis(self.0));
            Ok(vec![RawSample::new(1, "init", 0, 0, 0)])
        }

        fn name(&self) -> &'static str {
            "sleepy"
        }
    }

    #[test]
    fn timed_provider_passes_through() {
        let mut p = TimedProvider::new(Sleepy(0), Duration::from_millis(500)).unwrap();
        assert_eq!(p.name(), "sleepy");
        assert_eq!(p.collect().unwrap().len(), 1);
    }

    #[test]
    fn timed_provider_times_out() {
        let mut p = TimedProvider::new(Sleepy(300), Duration::from_millis(20)).unwrap();
        let err = p.collect().unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { millis: 20 }));
        let common: sg_common::Error = err.into();
        assert_eq!(common.code(), 31);
    }

    /// Scan time is adjustable from the test while the worker runs.
    struct Throttled(Arc<AtomicU64>);

    impl SamplesProvider for Throttled {
        fn collect(&mut self) -> Result<Vec<RawSample>, ProviderError> {
            std::thread::sleep(Duration::from_millis(self.0.load(Ordering::SeqCst)));
            Ok(vec![RawSample::new(1, "init", 0, 0, 0)])
        }

        fn name(&self) -> &'static str {
            "throttled"
        }
    }

    #[test]
    fn overloaded_provider_recovers_once_it_speeds_up() {
        let delay = Arc::new(AtomicU64::new(100));
        let mut p =
            TimedProvider::new(Throttled(Arc::clone(&delay)), Duration::from_millis(20)).unwrap();
        for _ in 0..20 {
            assert!(p.collect().is_err());
        }
        delay.store(0, Ordering::SeqCst);
        // Only the first slow scan ever ran; nothing is queued behind it.
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(p.collect().unwrap().len(), 1);
    }
}
