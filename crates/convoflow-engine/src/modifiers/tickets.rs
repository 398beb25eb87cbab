//! Ticket modifiers.

use uuid::Uuid;

use crate::assets::{Topic, User};
use crate::events::{
    Event, TicketAssigneeChanged, TicketClosed, TicketNoteAdded, TicketOpened, TicketReopened,
    TicketTopicChanged,
};
use crate::run::EventCallback;
use crate::types::{Contact, Ticket, TicketStatus};

/// Opens a ticket unless the contact already has an open one.
pub(super) fn apply_open(
    contact: &mut Contact,
    ticket_uuid: Uuid,
    topic: &Topic,
    assignee: Option<&User>,
    note: &str,
    log: &mut EventCallback<'_>,
) -> bool {
    if contact.tickets().open_count() > 0 {
        return false;
    }

    let mut ticket = Ticket::new(
        ticket_uuid,
        Some(topic.reference()),
        assignee.map(User::reference),
    );
    if !note.is_empty() {
        ticket.last_note = Some(note.to_string());
    }
    log(Event::new(TicketOpened::new(&ticket, note)));
    contact.tickets_mut().add(ticket);
    true
}

/// Runs `change` on each listed ticket the contact has, collecting an
/// event for each one it reports as changed.
fn for_each_ticket(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    log: &mut EventCallback<'_>,
    mut change: impl FnMut(&mut Ticket) -> Option<Event>,
) -> bool {
    let mut modified = false;
    for uuid in ticket_uuids {
        let Some(ticket) = contact.tickets_mut().get_mut(*uuid) else {
            continue;
        };
        if let Some(event) = change(ticket) {
            log(event);
            modified = true;
        }
    }
    modified
}

pub(super) fn apply_close(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    log: &mut EventCallback<'_>,
) -> bool {
    for_each_ticket(contact, ticket_uuids, log, |ticket| {
        if !ticket.is_open() {
            return None;
        }
        ticket.status = TicketStatus::Closed;
        Some(Event::new(TicketClosed {
            ticket_uuid: ticket.uuid,
        }))
    })
}

pub(super) fn apply_reopen(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    log: &mut EventCallback<'_>,
) -> bool {
    for_each_ticket(contact, ticket_uuids, log, |ticket| {
        if ticket.is_open() {
            return None;
        }
        ticket.status = TicketStatus::Open;
        Some(Event::new(TicketReopened {
            ticket_uuid: ticket.uuid,
        }))
    })
}

pub(super) fn apply_assignee(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    assignee: Option<&User>,
    log: &mut EventCallback<'_>,
) -> bool {
    let assignee = assignee.map(User::reference);
    for_each_ticket(contact, ticket_uuids, log, |ticket| {
        if ticket.assignee == assignee {
            return None;
        }
        ticket.assignee = assignee.clone();
        Some(Event::new(TicketAssigneeChanged {
            ticket_uuid: ticket.uuid,
            assignee: assignee.clone(),
        }))
    })
}

pub(super) fn apply_topic(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    topic: &Topic,
    log: &mut EventCallback<'_>,
) -> bool {
    let topic = topic.reference();
    for_each_ticket(contact, ticket_uuids, log, |ticket| {
        if ticket.topic.as_ref() == Some(&topic) {
            return None;
        }
        ticket.topic = Some(topic.clone());
        Some(Event::new(TicketTopicChanged {
            ticket_uuid: ticket.uuid,
            topic: topic.clone(),
        }))
    })
}

pub(super) fn apply_note(
    contact: &mut Contact,
    ticket_uuids: &[Uuid],
    note: &str,
    log: &mut EventCallback<'_>,
) -> bool {
    if note.is_empty() {
        return false;
    }
    for_each_ticket(contact, ticket_uuids, log, |ticket| {
        if ticket.last_note.as_deref() == Some(note) {
            return None;
        }
        ticket.last_note = Some(note.to_string());
        Some(Event::new(TicketNoteAdded {
            ticket_uuid: ticket.uuid,
            note: note.to_string(),
        }))
    })
}
