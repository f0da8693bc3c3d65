//! Bounded waits around transport calls
//!
//! Each call is raced against its own deadline. When the deadline wins the
//! caller gets the stage error, and the call keeps running on its own task;
//! whatever it eventually returns is dropped. Deadlines are never nested or
//! inherited between stages.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, warn};

use crate::core::bluetooth::channel_map::Channel;
use crate::core::bluetooth::transport::TransportError;
use crate::core::error::BridgeError;

/// Kind of transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Initialize,
    CheckRadio,
    Scan,
    StopScan,
    CheckConnected,
    Connect,
    Disconnect,
    RetrieveChannels,
    Read,
    Write,
    Subscribe,
    Unsubscribe,
}

/// Identifies a pending operation; at most one may be in flight per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub kind: CallKind,
    pub channel: Option<Channel>,
}

impl OperationKey {
    pub fn new(kind: CallKind) -> Self {
        Self { kind, channel: None }
    }

    pub fn on(kind: CallKind, channel: Channel) -> Self {
        Self {
            kind,
            channel: Some(channel),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(channel) => write!(f, "{:?}({})", self.kind, channel),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Runs transport calls with a deadline, one at a time per key
#[derive(Clone, Default)]
pub struct OperationPipeline {
    slots: Arc<Mutex<HashMap<OperationKey, Slot>>>,
}

impl OperationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: OperationKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key).or_default().clone()
    }

    /// True while a call for `key` is being waited on
    pub fn is_pending(&self, key: OperationKey) -> bool {
        self.slot(key).try_lock().is_err()
    }

    /// Waits at most `limit` for `call`.
    ///
    /// A transport error, a panic in the call, and the deadline all map to
    /// `failure`; the underlying cause is only logged.
    pub async fn bounded<T, F>(
        &self,
        key: OperationKey,
        limit: Duration,
        failure: BridgeError,
        call: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let slot = self.slot(key);
        let _pending = slot.lock().await;

        debug!("{} started, deadline {:?}", key, limit);
        let handle = tokio::spawn(call);

        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(Ok(value))) => {
                debug!("{} settled", key);
                Ok(value)
            }
            Ok(Ok(Err(e))) => {
                warn!("{} failed: {}", key, e);
                Err(failure)
            }
            Ok(Err(e)) => {
                error!("{} task failed: {}", key, e);
                Err(failure)
            }
            Err(_) => {
                warn!("{} gave no answer within {:?}", key, limit);
                Err(failure)
            }
        }
    }
}

/// Back-to-back discovery passes.
///
/// One pass does not reliably find the peripheral on every stack, so the
/// scan runs a short window followed by a longer one. A pass is skipped as
/// soon as a match has been recorded.
// TODO: retest a single long window against the Pi once hardware is back on the bench.
#[derive(Debug, Clone)]
pub struct DiscoveryPolicy {
    pub windows: Vec<Duration>,
    pub allow_duplicates: bool,
    /// Slack added to each window before the pass is declared hung
    pub grace: Duration,
}

impl DiscoveryPolicy {
    pub fn new(windows: Vec<Duration>, allow_duplicates: bool, grace: Duration) -> Self {
        Self {
            windows,
            allow_duplicates,
            grace,
        }
    }

    /// Runs passes until `found` reports a match. Returns whether one was found.
    pub async fn run<P, Fut, M>(&self, mut pass: P, found: M) -> Result<bool, BridgeError>
    where
        P: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<(), BridgeError>>,
        M: Fn() -> bool,
    {
        for (index, window) in self.windows.iter().enumerate() {
            if found() {
                debug!("Match recorded, skipping discovery pass {}", index + 1);
                break;
            }
            debug!("Discovery pass {} for {:?}", index + 1, window);
            pass(*window).await?;
        }
        Ok(found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> OperationKey {
        OperationKey::on(CallKind::Write, Channel::CommandInput)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_value_when_call_settles_first() {
        let pipeline = OperationPipeline::new();
        let value = pipeline
            .bounded(key(), Duration::from_secs(5), BridgeError::Write, async { Ok(7u8) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_maps_to_stage_error() {
        let pipeline = OperationPipeline::new();
        let err = pipeline
            .bounded(key(), Duration::from_secs(5), BridgeError::Write, async {
                Err::<(), _>(TransportError::Other("gatt 133".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Write));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out_and_late_result_is_dropped() {
        let pipeline = OperationPipeline::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();

        let err = pipeline
            .bounded(key(), Duration::from_secs(5), BridgeError::Write, async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Write));
        assert!(!pipeline.is_pending(key()));

        // the native call is not cancelled, it finishes in the background
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_waits_for_the_pending_call() {
        let pipeline = OperationPipeline::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let pipeline = pipeline.clone();
            let order = order.clone();
            tokio::spawn(async move {
                pipeline
                    .bounded(key(), Duration::from_secs(5), BridgeError::Write, async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        order.lock().unwrap().push("first");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(pipeline.is_pending(key()));

        let order_second = order.clone();
        pipeline
            .bounded(key(), Duration::from_secs(5), BridgeError::Write, async move {
                order_second.lock().unwrap().push("second");
                Ok(())
            })
            .await
            .unwrap();

        first.await.unwrap().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn discovery_stops_after_a_match() {
        let policy = DiscoveryPolicy::new(
            vec![Duration::from_secs(3), Duration::from_secs(5)],
            true,
            Duration::from_secs(5),
        );
        let passes = AtomicUsize::new(0);

        let found = policy
            .run(
                |_| {
                    passes.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                || passes.load(Ordering::SeqCst) >= 1,
            )
            .await
            .unwrap();
        assert!(found);
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discovery_runs_every_window_without_a_match() {
        let policy = DiscoveryPolicy::new(
            vec![Duration::from_secs(3), Duration::from_secs(5)],
            true,
            Duration::from_secs(5),
        );
        let windows = Mutex::new(Vec::new());

        let found = policy
            .run(
                |window| {
                    windows.lock().unwrap().push(window);
                    async { Ok(()) }
                },
                || false,
            )
            .await
            .unwrap();
        assert!(!found);
        assert_eq!(
            *windows.lock().unwrap(),
            vec![Duration::from_secs(3), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn discovery_failure_stops_the_scan() {
        let policy = DiscoveryPolicy::new(
            vec![Duration::from_secs(3), Duration::from_secs(5)],
            true,
            Duration::from_secs(5),
        );
        let passes = AtomicUsize::new(0);

        let err = policy
            .run(
                |_| {
                    passes.fetch_add(1, Ordering::SeqCst);
                    async { Err(BridgeError::Scan) }
                },
                || false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Scan));
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }
}
