// Handshake Badge: Broker Topics & Inbound Messages
//
// The MQTT client delivers messages on its own task. `Inbox` turns them
// into the flags the orchestrator polls; it is shared behind a mutex and
// every handler is a single assignment.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::link::{Command, Status};

/// Topic names for one device at one event.
#[derive(Debug, Clone)]
pub struct Topics {
    device_id: String,
    event_id: String,
}

impl Topics {
    pub fn new(device_id: &str, event_id: &str) -> Self {
        Self {
            device_id: device_id.to_owned(),
            event_id: event_id.to_owned(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn receipt(&self) -> String {
        format!("device/{}/receipt", self.device_id)
    }

    pub fn availability(&self) -> String {
        format!("event/{}/available_devices/{}", self.event_id, self.device_id)
    }

    pub fn exchange(&self) -> String {
        format!("event/{}/profile_swap", self.event_id)
    }

    pub fn subscriptions(&self) -> [String; 3] {
        [
            format!("device/{}/#", self.device_id),
            format!("event/{}/#", self.event_id),
            format!("event/{}/handshake_success/#", self.event_id),
        ]
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Receipt<'a> {
    command: &'a str,
    status: &'a str,
}

#[derive(Serialize)]
struct Availability<'a> {
    event_id: &'a str,
    device_id: &'a str,
    is_available: bool,
}

#[derive(Serialize)]
struct Exchange<'a> {
    event_id: &'a str,
    ticket_id: &'a str,
    ticket_id_to_swap: &'a str,
}

pub fn receipt_payload(command: Command, status: Status) -> serde_json::Result<String> {
    serde_json::to_string(&Receipt {
        command: command.as_str(),
        status: status.as_str(),
    })
}

pub fn availability_payload(topics: &Topics) -> serde_json::Result<String> {
    serde_json::to_string(&Availability {
        event_id: topics.event_id(),
        device_id: topics.device_id(),
        is_available: true,
    })
}

pub fn exchange_payload(topics: &Topics, own_ticket: &str, peer_ticket: &str) -> serde_json::Result<String> {
    serde_json::to_string(&Exchange {
        event_id: topics.event_id(),
        ticket_id: own_ticket,
        ticket_id_to_swap: peer_ticket,
    })
}

// ---------------------------------------------------------------------------
// Inbound state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Inbox {
    pub ticket_id: Option<String>,
    pub ticket_reset: bool,
    pub nfc_reset: bool,
    pub profile_swap: bool,
    pub reboot_requested: bool,
}

impl Inbox {
    /// Apply one inbound message. Unknown topics are ignored.
    pub fn handle(&mut self, topics: &Topics, topic: &str, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload).trim().to_owned();

        if let Some(leaf) = topic
            .strip_prefix("device/")
            .and_then(|t| t.strip_prefix(topics.device_id()))
            .and_then(|t| t.strip_prefix('/'))
        {
            match leaf {
                "assignment" => {
                    log::info!("Ticket assigned: {}", text);
                    self.ticket_id = non_empty(text);
                }
                "reassignment" => {
                    log::info!("Ticket reassigned: {}", text);
                    self.ticket_id = non_empty(text);
                    self.ticket_reset = true;
                }
                "resetNFC" => self.nfc_reset = true,
                "reboot" => self.reboot_requested = true,
                _ => {}
            }
            return;
        }

        if let Some(leaf) = topic
            .strip_prefix("event/")
            .and_then(|t| t.strip_prefix(topics.event_id()))
            .and_then(|t| t.strip_prefix('/'))
        {
            if leaf == "reboot" {
                self.reboot_requested = true;
            } else if let Some(target) = leaf.strip_prefix("profile_swap/") {
                if self.ticket_id.as_deref() == Some(target) {
                    self.profile_swap = true;
                }
            }
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Inbox shared between the MQTT task and the main loop.
pub type SharedInbox = Arc<Mutex<Inbox>>;

pub fn lock_inbox(inbox: &Mutex<Inbox>) -> MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(PoisonError::into_inner)
}
