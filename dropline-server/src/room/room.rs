use dropline_core::{MemberInfo, PeerId, RoomCode};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Member {
    pub peer_id: PeerId,
    pub name: Option<String>,
}

/// A named group of peers. Members are kept in join order.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    members: Vec<Member>,
    created_at: Instant,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            members: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.members.iter().any(|m| &m.peer_id == peer_id)
    }

    /// Returns `false` when the peer was already a member.
    pub fn insert(&mut self, member: Member) -> bool {
        if self.contains(&member.peer_id) {
            return false;
        }
        self.members.push(member);
        true
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Member> {
        let index = self.members.iter().position(|m| &m.peer_id == peer_id)?;
        Some(self.members.remove(index))
    }

    pub fn snapshot(&self) -> Vec<MemberInfo> {
        self.members
            .iter()
            .map(|m| MemberInfo {
                peer_id: m.peer_id,
                name: m.name.clone(),
            })
            .collect()
    }

    pub fn peers_except(&self, peer_id: &PeerId) -> Vec<PeerId> {
        self.members
            .iter()
            .map(|m| m.peer_id)
            .filter(|id| id != peer_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
