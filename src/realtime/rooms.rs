use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::realtime::events::ServerEvent;

pub fn ticket_room(ticket_id: Uuid) -> String {
    format!("ticket:{ticket_id}")
}

pub fn chat_room(session_id: &str) -> String {
    format!("chat:{session_id}")
}

/// Room membership registry. Each connection registers its outbound event
/// sender per room; broadcasting walks the members of one room. Membership
/// is explicit (join/leave) and cleared when the connection closes.
#[derive(Clone, Default)]
pub struct Rooms {
    inner: Arc<Mutex<HashMap<String, HashMap<Uuid, UnboundedSender<ServerEvent>>>>>,
}

impl Rooms {
    pub fn join(&self, room: &str, connection_id: Uuid, sender: UnboundedSender<ServerEvent>) {
        let mut rooms = self.inner.lock().expect("rooms lock poisoned");
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id, sender);
    }

    pub fn leave(&self, room: &str, connection_id: Uuid) {
        let mut rooms = self.inner.lock().expect("rooms lock poisoned");
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub fn leave_all(&self, connection_id: Uuid) {
        let mut rooms = self.inner.lock().expect("rooms lock poisoned");
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Delivers an event to every member of the room, the sender included.
    /// Members whose connection is gone are skipped; the write loop cleans
    /// them up when it exits.
    pub fn broadcast(&self, room: &str, event: &ServerEvent) {
        let rooms = self.inner.lock().expect("rooms lock poisoned");
        if let Some(members) = rooms.get(room) {
            for sender in members.values() {
                let _ = sender.send(event.clone());
            }
        }
    }

    #[cfg(test)]
    pub fn member_count(&self, room: &str) -> usize {
        let rooms = self.inner.lock().expect("rooms lock poisoned");
        rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn error_event(message: &str) -> ServerEvent {
        ServerEvent::Error {
            message: message.to_string(),
        }
    }

    #[test]
    fn broadcast_reaches_all_members_including_sender() {
        let rooms = Rooms::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        rooms.join("ticket:1", a, tx_a);
        rooms.join("ticket:1", b, tx_b);
        rooms.broadcast("ticket:1", &error_event("hello"));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn leaving_stops_delivery() {
        let rooms = Rooms::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        rooms.join("ticket:2", id, tx);
        rooms.leave("ticket:2", id);
        rooms.broadcast("ticket:2", &error_event("gone"));

        assert!(rx.try_recv().is_err());
        assert_eq!(rooms.member_count("ticket:2"), 0);
    }

    #[test]
    fn leave_all_clears_every_room() {
        let rooms = Rooms::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        rooms.join("ticket:3", id, tx.clone());
        rooms.join("chat:abc", id, tx);
        rooms.leave_all(id);

        assert_eq!(rooms.member_count("ticket:3"), 0);
        assert_eq!(rooms.member_count("chat:abc"), 0);
    }

    #[test]
    fn broadcast_to_unknown_room_is_a_no_op() {
        let rooms = Rooms::default();
        rooms.broadcast("ticket:none", &error_event("nobody"));
    }
}
