//! Per-company live dashboard fan-out.
//!
//! Sessions register under their company and receive every event of that
//! company through a bounded queue. Delivery is best effort: a full queue
//! drops the event for that session, and nothing is replayed on reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use merchant_core::events::{DomainEvent, dashboard_topic};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{EventSink, SinkError};

type SessionMap = HashMap<Uuid, mpsc::Sender<Arc<DomainEvent>>>;

/// Registry of connected dashboard sessions keyed by company.
pub struct LiveGateway {
    sessions: DashMap<Uuid, SessionMap>,
    buffer: usize,
}

impl LiveGateway {
    /// Creates a gateway whose sessions buffer up to `buffer` events.
    #[must_use]
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            buffer: buffer.max(1),
        })
    }

    /// Register a session for a company. Dropping the subscription
    /// unregisters it.
    pub fn subscribe(self: &Arc<Self>, company_id: Uuid) -> LiveSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let session_id = Uuid::new_v4();
        self.sessions
            .entry(company_id)
            .or_default()
            .insert(session_id, sender);
        debug!(company_id = %company_id, session_id = %session_id, "Live session registered");

        LiveSubscription {
            gateway: Arc::clone(self),
            company_id,
            session_id,
            receiver,
        }
    }

    /// Push an event to every session of its company.
    ///
    /// Returns how many sessions accepted it.
    pub fn broadcast(&self, event: &Arc<DomainEvent>) -> usize {
        let company_id = event.company_id;
        let mut accepted = 0;
        if let Some(mut sessions) = self.sessions.get_mut(&company_id) {
            sessions.retain(|session_id, sender| match sender.try_send(Arc::clone(event)) {
                Ok(()) => {
                    accepted += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        company_id = %company_id,
                        session_id = %session_id,
                        event_type = %event.event_type,
                        "Live session buffer full, event dropped"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        self.sessions.remove_if(&company_id, |_, sessions| sessions.is_empty());
        accepted
    }

    /// Connected sessions of a company.
    #[must_use]
    pub fn session_count(&self, company_id: Uuid) -> usize {
        self.sessions.get(&company_id).map_or(0, |s| s.len())
    }

    fn unregister(&self, company_id: Uuid, session_id: Uuid) {
        if let Some(mut sessions) = self.sessions.get_mut(&company_id) {
            sessions.remove(&session_id);
        }
        self.sessions.remove_if(&company_id, |_, sessions| sessions.is_empty());
        debug!(company_id = %company_id, session_id = %session_id, "Live session closed");
    }
}

#[async_trait]
impl EventSink for LiveGateway {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn deliver(&self, event: &DomainEvent) -> Result<(), SinkError> {
        self.broadcast(&Arc::new(event.clone()));
        Ok(())
    }
}

/// One connected dashboard session.
pub struct LiveSubscription {
    gateway: Arc<LiveGateway>,
    company_id: Uuid,
    session_id: Uuid,
    receiver: mpsc::Receiver<Arc<DomainEvent>>,
}

impl LiveSubscription {
    /// Next event for this session.
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.receiver.recv().await
    }

    /// Company the session is scoped to.
    #[must_use]
    pub const fn company_id(&self) -> Uuid {
        self.company_id
    }

    /// Broadcast group name of the session's company.
    #[must_use]
    pub fn topic(&self) -> String {
        dashboard_topic(self.company_id)
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.gateway.unregister(self.company_id, self.session_id);
    }
}
