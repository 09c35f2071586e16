use crate::error::TransportError;
use crate::types::{DatasetDescriptor, DatasetGroups, Sample, ServerEvent, SessionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

/// Sending half of one connected client
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    /// Create a session with a bounded outbound queue.
    ///
    /// The receiver is drained by the transport's writer task; dropping it
    /// closes the session.
    pub fn new(queue_capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue one event without waiting.
    ///
    /// Returns `Ok(false)` when the queue is full and the event was dropped.
    pub fn deliver(&self, event: ServerEvent) -> Result<bool, TransportError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed(self.id)),
        }
    }
}

/// What a newly connected client needs to see
#[derive(Debug, Clone, Default)]
struct StreamSnapshot {
    title: String,
    dataset: Option<DatasetDescriptor>,
}

/// Registry of connected sessions and fan-out point for every event.
///
/// Delivery is best effort: closed sessions are skipped and removed, full
/// queues drop the event for that session only, and nothing is retried.
#[derive(Clone)]
pub struct Broadcaster {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
    snapshot: Arc<RwLock<StreamSnapshot>>,
    available: Arc<DatasetGroups>,
}

impl Broadcaster {
    pub fn new(available: DatasetGroups, initial_title: &str) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            snapshot: Arc::new(RwLock::new(StreamSnapshot {
                title: initial_title.to_string(),
                dataset: None,
            })),
            available: Arc::new(available),
        }
    }

    /// Add a session and greet it with the current state
    pub fn register(&self, session: SessionHandle) {
        let mut sessions = self.sessions.write();
        let snapshot = self.snapshot.read().clone();

        let greeting = [
            Some(ServerEvent::Init {
                current_dataset: snapshot.dataset.as_ref().map(|d| d.relative_path.clone()),
                available_datasets: (*self.available).clone(),
            }),
            Some(ServerEvent::DatasetTitle {
                title: snapshot.title.clone(),
            }),
            snapshot.dataset.as_ref().map(|d| ServerEvent::Status {
                message: "Connected to data stream".to_string(),
                current_dataset: Some(d.filename.clone()),
            }),
        ];

        for event in greeting.into_iter().flatten() {
            if let Err(e) = session.deliver(event) {
                debug!("Session closed during greeting: {}", e);
                return;
            }
        }

        debug!("Registered session {}", session.id());
        sessions.insert(session.id(), session);
    }

    /// Remove a session; disconnects and transport errors are treated alike
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn is_registered(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Send to every open session; returns how many accepted the event
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for session in self.sessions.read().values() {
            if !session.is_open() {
                dead.push(session.id());
                continue;
            }
            match session.deliver(event.clone()) {
                Ok(true) => delivered += 1,
                Ok(false) => debug!("Session {} queue full, event dropped", session.id()),
                Err(_) => dead.push(session.id()),
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write();
            for id in &dead {
                sessions.remove(id);
            }
            debug!("Dropped {} closed sessions", dead.len());
        }

        delivered
    }

    /// Send to a single session only
    pub fn unicast(&self, id: &SessionId, event: ServerEvent) -> Result<(), TransportError> {
        let session = self.sessions.read().get(id).cloned();
        match session {
            Some(session) => match session.deliver(event) {
                Ok(_) => Ok(()),
                Err(e) => {
                    self.unregister(id);
                    Err(e)
                }
            },
            None => Err(TransportError::Closed(*id)),
        }
    }

    pub fn publish_sample(&self, sample: &Sample) -> usize {
        self.broadcast(&ServerEvent::calm(sample))
    }

    /// Record a source change and tell every session about it
    pub fn announce_source(&self, title: String, dataset: Option<DatasetDescriptor>) {
        {
            let mut snapshot = self.snapshot.write();
            snapshot.title = title.clone();
            snapshot.dataset = dataset.clone();
        }

        self.broadcast(&ServerEvent::DatasetTitle { title });

        if let Some(dataset) = dataset {
            self.broadcast(&ServerEvent::DatasetSelected {
                message: format!("Started streaming dataset: {}", dataset.filename),
                path: dataset.relative_path,
                name: dataset.filename,
            });
        }
    }

    pub fn current_title(&self) -> String {
        self.snapshot.read().title.clone()
    }
}
