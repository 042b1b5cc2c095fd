use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use fablink_types::events::LiveEvent;

/// Manages all connected clients: named rooms for targeted fan-out, a
/// global broadcast channel for presence, and a per-identity connection
/// counter. Constructed once at process start and injected wherever events
/// are published; all state dies with the process and is rebuilt as
/// clients reconnect.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global channel — every connected client receives these.
    broadcast_tx: broadcast::Sender<LiveEvent>,

    /// Room name -> (conn_id -> targeted sender). A connection sits in its
    /// `user:<id>` and `role:<role>` rooms for its whole lifetime.
    rooms: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<LiveEvent>>>>,

    /// Live connection count per identity. Presence flips only on the
    /// 0 -> 1 and 1 -> 0 edges, so multi-device sessions never flap.
    presence: RwLock<HashMap<Uuid, usize>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                rooms: RwLock::new(HashMap::new()),
                presence: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: LiveEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Add a connection's sender to each named room.
    pub async fn join(
        &self,
        rooms: &[String],
        conn_id: Uuid,
        tx: mpsc::UnboundedSender<LiveEvent>,
    ) {
        let mut map = self.inner.rooms.write().await;
        for room in rooms {
            map.entry(room.clone()).or_default().insert(conn_id, tx.clone());
        }
    }

    /// Remove a connection from each named room, dropping rooms that
    /// become empty.
    pub async fn leave(&self, rooms: &[String], conn_id: Uuid) {
        let mut map = self.inner.rooms.write().await;
        for room in rooms {
            if let Some(members) = map.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    map.remove(room);
                }
            }
        }
    }

    /// Deliver an event to every live connection in a room. A room nobody
    /// joined is a no-op.
    pub async fn publish(&self, room: &str, event: LiveEvent) {
        let map = self.inner.rooms.read().await;
        if let Some(members) = map.get(room) {
            for tx in members.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Count a new live connection. Returns true when this is the
    /// identity's first, i.e. the moment it comes online.
    pub async fn connect(&self, user_id: Uuid) -> bool {
        let mut presence = self.inner.presence.write().await;
        let count = presence.entry(user_id).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Count a closed connection. Returns true when it was the identity's
    /// last, i.e. the moment it goes offline.
    pub async fn disconnect(&self, user_id: Uuid) -> bool {
        let mut presence = self.inner.presence.write().await;
        match presence.get_mut(&user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                presence.remove(&user_id);
                true
            }
            None => false,
        }
    }

    /// Identities with at least one live connection.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.presence.read().await.keys().copied().collect()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .presence
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fablink_types::events::user_room;

    #[tokio::test]
    async fn test_presence_flips_only_on_edges() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        assert!(dispatcher.connect(user).await);
        assert!(!dispatcher.connect(user).await);
        assert_eq!(dispatcher.connection_count(user).await, 2);

        assert!(!dispatcher.disconnect(user).await);
        assert!(dispatcher.disconnect(user).await);
        assert_eq!(dispatcher.connection_count(user).await, 0);

        // Stray disconnect after the counter is gone stays quiet.
        assert!(!dispatcher.disconnect(user).await);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_connection_in_room() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let room = user_room(user);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        dispatcher.join(std::slice::from_ref(&room), Uuid::new_v4(), tx_a).await;
        dispatcher.join(std::slice::from_ref(&room), Uuid::new_v4(), tx_b).await;

        dispatcher
            .publish(&room, LiveEvent::Presence { user_id: user, online: true })
            .await;

        assert!(matches!(rx_a.try_recv(), Ok(LiveEvent::Presence { .. })));
        assert!(matches!(rx_b.try_recv(), Ok(LiveEvent::Presence { .. })));
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let room = user_room(Uuid::new_v4());
        let conn = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.join(std::slice::from_ref(&room), conn, tx).await;
        dispatcher.leave(std::slice::from_ref(&room), conn).await;

        dispatcher
            .publish(
                &room,
                LiveEvent::Presence { user_id: Uuid::new_v4(), online: false },
            )
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_empty_room_is_noop() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .publish(
                "user:nobody",
                LiveEvent::Presence { user_id: Uuid::new_v4(), online: true },
            )
            .await;
    }
}
