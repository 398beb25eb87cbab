//! Ticket events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Ticket, TopicReference, UserReference};

/// The ticket as recorded on a `ticket_opened` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedTicket {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketOpened {
    pub ticket: OpenedTicket,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

impl TicketOpened {
    pub fn new(ticket: &Ticket, note: &str) -> Self {
        Self {
            ticket: OpenedTicket {
                uuid: ticket.uuid,
                topic: ticket.topic.clone(),
                assignee: ticket.assignee.clone(),
            },
            note: note.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketClosed {
    pub ticket_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReopened {
    pub ticket_uuid: Uuid,
}

/// `ticket_assignee_changed`: no assignee means the ticket was unassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAssigneeChanged {
    pub ticket_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTopicChanged {
    pub ticket_uuid: Uuid,
    pub topic: TopicReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketNoteAdded {
    pub ticket_uuid: Uuid,
    pub note: String,
}
