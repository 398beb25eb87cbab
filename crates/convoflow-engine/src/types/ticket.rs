//! Tickets opened for contacts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reference::{TopicReference, UserReference};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub uuid: Uuid,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_note: Option<String>,
}

impl Ticket {
    pub fn new(uuid: Uuid, topic: Option<TopicReference>, assignee: Option<UserReference>) -> Self {
        Self {
            uuid,
            status: TicketStatus::Open,
            topic,
            assignee,
            last_note: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }
}

/// The tickets a contact has, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketList(Vec<Ticket>);

impl TicketList {
    pub fn new(tickets: Vec<Ticket>) -> Self {
        Self(tickets)
    }

    pub fn all(&self) -> &[Ticket] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recently opened ticket that is still open.
    pub fn open(&self) -> Option<&Ticket> {
        self.0.iter().rev().find(|t| t.is_open())
    }

    pub fn open_count(&self) -> usize {
        self.0.iter().filter(|t| t.is_open()).count()
    }

    pub fn get(&self, uuid: Uuid) -> Option<&Ticket> {
        self.0.iter().find(|t| t.uuid == uuid)
    }

    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut Ticket> {
        self.0.iter_mut().find(|t| t.uuid == uuid)
    }

    /// Adds a ticket, replacing any existing ticket with the same UUID.
    pub fn add(&mut self, ticket: Ticket) {
        match self.get_mut(ticket.uuid) {
            Some(existing) => *existing = ticket,
            None => self.0.push(ticket),
        }
    }
}
