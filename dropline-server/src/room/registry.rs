use crate::error::RoutingMiss;
use crate::room::room::{Member, Room};
use dropline_core::{MemberInfo, PeerId, RoomCode};
use std::collections::HashMap;
use tracing::{debug, info};

/// Result of a join. `notify` lists the members that must learn about the newcomer;
/// it is empty when the peer was already in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room: RoomCode,
    pub members: Vec<MemberInfo>,
    pub notify: Vec<PeerId>,
    pub created: bool,
    /// Set when the peer moved here from another room.
    pub left: Option<LeaveOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room: RoomCode,
    pub remaining: Vec<PeerId>,
    pub room_closed: bool,
}

/// Room membership for one relay. A peer is in at most one room; empty rooms are dropped.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    memberships: HashMap<PeerId, RoomCode>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, peer_id: PeerId, code: RoomCode, name: Option<String>) -> JoinOutcome {
        let moving = self
            .memberships
            .get(&peer_id)
            .is_some_and(|current| current != &code);
        let left = if moving { self.leave(&peer_id) } else { None };

        let created = !self.rooms.contains_key(&code);
        let room = self.rooms.entry(code.clone()).or_insert_with(|| {
            info!("Creating room '{}'", code);
            Room::new(code.clone())
        });

        let inserted = room.insert(Member { peer_id, name });
        let notify = if inserted {
            room.peers_except(&peer_id)
        } else {
            debug!("Peer {} rejoined room '{}'", peer_id, code);
            Vec::new()
        };
        let members = room.snapshot();

        self.memberships.insert(peer_id, code.clone());

        JoinOutcome {
            room: code,
            members,
            notify,
            created,
            left,
        }
    }

    pub fn leave(&mut self, peer_id: &PeerId) -> Option<LeaveOutcome> {
        let code = self.memberships.remove(peer_id)?;
        let room = self.rooms.get_mut(&code)?;
        room.remove(peer_id);

        let remaining = room.peers_except(peer_id);
        let room_closed = room.is_empty();
        if room_closed {
            if let Some(room) = self.rooms.remove(&code) {
                info!("Room '{}' is empty after {:?}, removing", code, room.age());
            }
        }

        Some(LeaveOutcome {
            room: code,
            remaining,
            room_closed,
        })
    }

    /// Both peers must sit in the same room.
    pub fn route(&self, sender: &PeerId, target: &PeerId) -> Result<(), RoutingMiss> {
        let code = self
            .memberships
            .get(sender)
            .ok_or(RoutingMiss::SenderNotJoined(*sender))?;

        match self.memberships.get(target) {
            Some(target_room) if target_room == code => Ok(()),
            _ => Err(RoutingMiss::TargetAbsent {
                target: *target,
                room: code.clone(),
            }),
        }
    }

    pub fn room_of(&self, peer_id: &PeerId) -> Option<&RoomCode> {
        self.memberships.get(peer_id)
    }

    pub fn snapshot(&self, code: &RoomCode) -> Option<Vec<MemberInfo>> {
        self.rooms.get(code).map(Room::snapshot)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        self.memberships.len()
    }
}
