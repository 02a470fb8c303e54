//! Live connection registry.
//!
//! Maps connection ids to handles holding the subscription identity, its
//! derived topic set, and the connection's outbound queue. The registry is
//! process-local and rebuilt from nothing on restart; clients re-subscribe
//! and re-sync from the durable store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use focal_core::defaults::OUTBOUND_QUEUE_CAPACITY;
use focal_core::{topics_for, Error, Result, Role, Subscription, Topic};

use crate::queue::OutboundQueue;

/// One registered connection: identity, topic set, and outbound queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub subscription: Subscription,
    pub topics: BTreeSet<Topic>,
    pub queue: OutboundQueue,
}

impl ConnectionHandle {
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }
}

/// Registry of live connections, keyed by connection id.
///
/// Uses a std `RwLock` rather than an async lock: every critical section
/// is a short map operation with no await points, and publishers call in
/// from synchronous code.
pub struct SubscriptionRegistry {
    connections: RwLock<HashMap<Uuid, Arc<ConnectionHandle>>>,
    queue_capacity: usize,
}

impl SubscriptionRegistry {
    /// Create a registry whose connections buffer at most `queue_capacity`
    /// outbound frames each.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Register a connection and derive its topic set.
    ///
    /// Fails with [`Error::DuplicateConnection`] when the id is already
    /// registered; the existing connection is unaffected.
    pub fn subscribe(
        &self,
        connection_id: Uuid,
        user_id: i64,
        role: Role,
        branch_id: Option<i64>,
    ) -> Result<Arc<ConnectionHandle>> {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if connections.contains_key(&connection_id) {
            return Err(Error::DuplicateConnection { connection_id });
        }

        let subscription = Subscription::new(connection_id, user_id, role, branch_id);
        let topics = topics_for(&subscription);
        let handle = Arc::new(ConnectionHandle {
            subscription,
            topics,
            queue: OutboundQueue::new(self.queue_capacity),
        });
        connections.insert(connection_id, handle.clone());

        debug!(
            subsystem = "delivery",
            component = "registry",
            op = "subscribe",
            connection_id = %connection_id,
            user_id,
            role = role.as_str(),
            branch_id = ?branch_id,
            connections = connections.len(),
            "Connection subscribed"
        );
        Ok(handle)
    }

    /// Remove a connection and close its queue so the consumer task wakes
    /// and terminates. Returns false when the id was not registered.
    pub fn unsubscribe(&self, connection_id: &Uuid) -> bool {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(connection_id);

        match removed {
            Some(handle) => {
                handle.queue.close();
                debug!(
                    subsystem = "delivery",
                    component = "registry",
                    op = "unsubscribe",
                    connection_id = %connection_id,
                    dropped = handle.queue.dropped(),
                    "Connection unsubscribed"
                );
                true
            }
            None => false,
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, connection_id: &Uuid) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(connection_id)
    }

    pub fn get(&self, connection_id: &Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_id)
            .cloned()
    }

    /// All live connection handles (ops/introspection).
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Handles subscribed to the given topic.
    pub fn matching(&self, topic: &Topic) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| handle.is_subscribed(topic))
            .cloned()
            .collect()
    }

    /// Force-unsubscribe everything (shutdown teardown). Every queue is
    /// closed; the drained handles are returned for logging.
    pub fn drain(&self) -> Vec<Arc<ConnectionHandle>> {
        let drained: Vec<_> = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        for handle in &drained {
            handle.queue.close();
        }
        if !drained.is_empty() {
            debug!(
                subsystem = "delivery",
                component = "registry",
                op = "drain",
                connections = drained.len(),
                "Registry drained"
            );
        }
        drained
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(OUTBOUND_QUEUE_CAPACITY)
    }
}
