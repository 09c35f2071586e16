use crate::registry::Broadcaster;
use crate::types::{Sample, ServerEvent};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Publishing side handed to a producer task.
///
/// Every publish happens under the same gate that [`Producer::stop`] takes,
/// so a stopped producer can never emit after `stop` has returned.
#[derive(Clone)]
pub struct Emitter {
    hub: Broadcaster,
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl Emitter {
    /// Publish one sample; returns false once the producer was stopped
    pub fn publish(&self, sample: &Sample) -> bool {
        let _gate = self.gate.lock();
        if self.token.is_cancelled() {
            return false;
        }
        self.hub.publish_sample(sample);
        true
    }

    /// Broadcast a non-sample event under the same gate
    pub fn notify(&self, event: &ServerEvent) -> bool {
        let _gate = self.gate.lock();
        if self.token.is_cancelled() {
            return false;
        }
        self.hub.broadcast(event);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the producer is stopped
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// A running sample producer (replay loop or live subscription)
pub struct Producer {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
    task: Option<JoinHandle<()>>,
}

impl Producer {
    /// Start a producer.
    ///
    /// `body` runs synchronously before the returned future is spawned, so
    /// anything it publishes is delivered before `spawn` returns.
    pub fn spawn<F, Fut>(hub: &Broadcaster, body: F) -> Self
    where
        F: FnOnce(Emitter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let gate = Arc::new(Mutex::new(()));
        let emitter = Emitter {
            hub: hub.clone(),
            token: token.clone(),
            gate: gate.clone(),
        };

        let future = body(emitter);
        let task = tokio::spawn(future);

        Self {
            token,
            gate,
            task: Some(task),
        }
    }

    /// Cancel the producer; idempotent
    pub fn stop(&mut self) {
        {
            let _gate = self.gate.lock();
            self.token.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when the task ended on its own or was stopped
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}
