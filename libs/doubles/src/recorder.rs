//! Call recording
//!
//! Every installed stub notifies the owning test with the call shape before
//! its result is produced. Notifications are fire-and-forget over an
//! unbounded channel; the test asserts on receipt through its inbox with an
//! explicit timeout. The core never buffers or replays missed messages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::trace;

use crate::messages::{CallArgs, RecordedCall, Value};

/// Sending half of a test's recorded-call channel
pub type TestAddress = mpsc::UnboundedSender<RecordedCall>;

/// Receiving half, shared across clones of one double
#[derive(Debug, Clone)]
pub struct TestInbox {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<RecordedCall>>>,
}

impl TestInbox {
    /// Create a fresh recorded-call channel
    pub fn channel() -> (TestAddress, TestInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            TestInbox {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Next recorded call, or `None` once `wait` elapses
    pub async fn next_call(&self, wait: Duration) -> Option<RecordedCall> {
        let mut rx = self.rx.lock().await;
        timeout(wait, rx.recv()).await.ok().flatten()
    }

    /// Wait for a call matching `name` (and `args`, when given), discarding
    /// non-matching notifications along the way. `None` on timeout.
    pub async fn expect_call(
        &self,
        name: &str,
        args: Option<&[Value]>,
        wait: Duration,
    ) -> Option<RecordedCall> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let call = self.next_call(remaining).await?;
            if call.name == name && args.map_or(true, |a| call.args.as_slice() == a) {
                return Some(call);
            }
            trace!(name = %call.name, "skipping non-matching recorded call");
        }
    }
}

/// Emits recorded-call notifications for one double
#[derive(Debug, Clone)]
pub struct CallRecorder {
    address: TestAddress,
    /// Source identity to tag messages with, when configured
    source_tag: Option<String>,
}

impl CallRecorder {
    pub fn new(address: TestAddress, source_tag: Option<String>) -> Self {
        Self { address, source_tag }
    }

    /// Fire-and-forget notification; a gone receiver drops the message
    pub fn record(&self, name: &str, args: CallArgs) {
        let call = RecordedCall::new(self.source_tag.clone(), name, args);
        if self.address.send(call).is_err() {
            trace!(stub = %name, "recorded-call receiver gone; dropping notification");
        }
    }
}
