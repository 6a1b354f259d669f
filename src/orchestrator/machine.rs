// Handshake Badge: Device State Machine
//
// Pure transition function. `step` never touches hardware: it returns the
// next state plus the side effects the orchestrator must carry out, so
// every transition can be exercised without a device.

use crate::config::*;
use crate::discovery::{EventId, TicketId};
use crate::events::ClassificationResult;
use crate::link::{Command, Status};
use crate::timing::{elapsed_ms, Deadline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Unassigned,
    /// Ticket stored, NFC tag not yet written.
    TagPending,
    TagWritten,
    GestureArmed,
    HandshakeDetected,
    DiscoveryActive,
    PeerFound(TicketId),
    Exchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub phase: Phase,
    pub ticket_id: Option<TicketId>,
    pub event_id: EventId,
    pub tag_written: bool,
    /// At least one exchange completed under the current assignment.
    pub exchanged: bool,
    handshake: Option<Deadline>,
    /// Peers already exchanged with under the current assignment.
    seen: heapless::Vec<TicketId, MAX_SEEN_PEERS>,
    tag_attempts: u8,
    last_tag_attempt: Option<u32>,
    publish_attempts: u8,
    last_publish_attempt: Option<u32>,
}

impl DeviceState {
    pub fn new(event_id: EventId) -> Self {
        Self {
            phase: Phase::Unassigned,
            ticket_id: None,
            event_id,
            tag_written: false,
            exchanged: false,
            handshake: None,
            seen: heapless::Vec::new(),
            tag_attempts: 0,
            last_tag_attempt: None,
            publish_attempts: 0,
            last_publish_attempt: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.ticket_id.is_some()
    }

    /// Debounced handshake flag: set on detection, held for
    /// HANDSHAKE_DEBOUNCE_MS unless an exchange completes first.
    pub fn handshake_detected(&self) -> bool {
        self.handshake.is_some()
    }

    pub fn discovery_active(&self) -> bool {
        self.phase == Phase::DiscoveryActive
    }

    pub fn peer_found(&self) -> Option<&TicketId> {
        match &self.phase {
            Phase::PeerFound(p) => Some(p),
            _ => None,
        }
    }

    pub fn has_seen(&self, ticket: &str) -> bool {
        self.seen.iter().any(|t| t.as_str() == ticket)
    }

    /// Sampling runs only while armed and outside the debounce window.
    pub fn gesture_armed(&self) -> bool {
        self.phase == Phase::GestureArmed && self.handshake.is_none()
    }

    pub fn tag_write_due(&self, now: u32) -> bool {
        self.phase == Phase::TagPending
            && self
                .last_tag_attempt
                .map_or(true, |t| elapsed_ms(now, t) >= TAG_WRITE_RETRY_MS)
    }

    /// A found peer is published right away, then every PUBLISH_RETRY_MS.
    pub fn exchange_publish_due(&self, now: u32) -> bool {
        self.peer_found().is_some()
            && self
                .last_publish_attempt
                .map_or(true, |t| elapsed_ms(now, t) >= PUBLISH_RETRY_MS)
    }

    fn remember_peer(&mut self, peer: &TicketId) {
        if self.seen.is_full() {
            self.seen.remove(0);
        }
        // Capacity was just ensured.
        let _ = self.seen.push(peer.clone());
    }

    fn forget_peer(&mut self, peer: &TicketId) {
        self.seen.retain(|t| t != peer);
    }

    fn restart_publish(&mut self) {
        self.publish_attempts = 0;
        self.last_publish_attempt = None;
    }

    fn restart_tag_write(&mut self) {
        self.tag_attempts = 0;
        self.last_tag_attempt = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Timers only; emitted once per loop pass before any polling.
    Tick,
    Reassigned,
    TagReset,
    ProfileSwap,
    Assigned(TicketId),
    TagWriteSucceeded,
    TagWriteFailed,
    Gesture(ClassificationResult),
    DiscoveryStarted,
    DiscoveryStartFailed,
    DiscoveryResolved(Option<TicketId>),
    ExchangePublished,
    ExchangePublishFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Receipt(Command, Status),
    Pulse { power: u8, duration_ms: u32 },
    InitClassifier,
    ClearWindow,
    AbortDiscovery,
    EraseTag,
    AckTicketReset,
    AckNfcReset,
    AckProfileSwap,
}

/// Two-threshold acceptance for the handshake class.
pub fn is_handshake(result: &ClassificationResult) -> bool {
    result.class_id == HANDSHAKE_CLASS
        && result.confidence > ACCEPT_THRESHOLD
        && result.confidence > PRESENCE_THRESHOLD
}

pub fn step(state: &DeviceState, event: Event, now: u32) -> (DeviceState, Vec<Effect>) {
    let mut next = state.clone();
    let mut fx = Vec::new();

    match event {
        Event::Reassigned => {
            next = DeviceState::new(state.event_id.clone());
            fx.push(Effect::AbortDiscovery);
            fx.push(Effect::ClearWindow);
            fx.push(Effect::AckTicketReset);
            fx.push(Effect::Receipt(Command::TicketReassignment, Status::Success));
        }

        Event::TagReset => {
            next.tag_written = false;
            next.restart_tag_write();
            fx.push(Effect::EraseTag);
            if let Some(peer) = state.peer_found() {
                next.forget_peer(peer);
            }
            if next.is_assigned() {
                next.phase = Phase::TagPending;
                next.handshake = None;
                next.restart_publish();
                fx.push(Effect::AbortDiscovery);
                fx.push(Effect::ClearWindow);
            }
            fx.push(Effect::AckNfcReset);
            fx.push(Effect::Receipt(Command::NfcReset, Status::Success));
        }

        Event::ProfileSwap => {
            fx.push(Effect::Pulse {
                power: HAPTIC_FULL_POWER,
                duration_ms: PROFILE_SWAP_PULSE_MS,
            });
            fx.push(Effect::AckProfileSwap);
        }

        Event::Tick => {
            if next.handshake.is_some_and(|d| d.has_elapsed(now)) {
                next.handshake = None;
            }
            let rearm = match &next.phase {
                Phase::TagWritten | Phase::Exchanged => true,
                Phase::HandshakeDetected => next.handshake.is_none(),
                Phase::PeerFound(peer) if !next.has_seen(peer) => {
                    log::warn!("Peer {} missing from seen-set, dropping", peer);
                    true
                }
                _ => false,
            };
            if rearm {
                next.restart_publish();
                next.phase = Phase::GestureArmed;
            }
        }

        Event::Assigned(ticket) if state.phase == Phase::Unassigned => {
            next.ticket_id = Some(ticket);
            next.phase = Phase::TagPending;
            next.restart_tag_write();
            fx.push(Effect::InitClassifier);
            fx.push(Effect::Receipt(Command::AssignDevice, Status::Success));
            fx.push(Effect::Pulse {
                power: HAPTIC_FULL_POWER,
                duration_ms: ASSIGN_PULSE_MS,
            });
        }

        Event::TagWriteSucceeded if state.phase == Phase::TagPending => {
            next.tag_written = true;
            next.phase = Phase::TagWritten;
            fx.push(Effect::Receipt(Command::WriteNfc, Status::Success));
        }

        Event::TagWriteFailed if state.phase == Phase::TagPending => {
            next.tag_attempts = next.tag_attempts.saturating_add(1);
            next.last_tag_attempt = Some(now);
            if next.tag_attempts >= TAG_WRITE_MAX_ATTEMPTS {
                log::warn!("Tag write failed {} times, continuing without tag", next.tag_attempts);
                next.phase = Phase::GestureArmed;
                fx.push(Effect::Receipt(Command::WriteNfc, Status::Failure));
            }
        }

        Event::Gesture(result) if state.gesture_armed() => {
            if is_handshake(&result) {
                next.phase = Phase::HandshakeDetected;
                next.handshake = Some(Deadline::starting_at(now, HANDSHAKE_DEBOUNCE_MS));
                fx.push(Effect::ClearWindow);
                fx.push(Effect::Receipt(Command::Handshake, Status::Success));
            }
        }

        Event::DiscoveryStarted if state.phase == Phase::HandshakeDetected => {
            next.phase = Phase::DiscoveryActive;
        }

        Event::DiscoveryResolved(peer) if state.phase == Phase::DiscoveryActive => match peer {
            Some(p) if next.has_seen(&p) => {
                log::info!("Already exchanged with {}, rearming", p);
                next.phase = Phase::GestureArmed;
            }
            Some(p) => {
                next.remember_peer(&p);
                next.restart_publish();
                next.phase = Phase::PeerFound(p);
            }
            None => next.phase = Phase::GestureArmed,
        },

        Event::ExchangePublished if state.peer_found().is_some() => {
            next.restart_publish();
            next.phase = Phase::Exchanged;
            next.exchanged = true;
            next.handshake = None;
            fx.push(Effect::Receipt(Command::ProfileExchange, Status::Success));
            fx.push(Effect::Pulse {
                power: HAPTIC_FULL_POWER,
                duration_ms: EXCHANGE_PULSE_MS,
            });
        }

        Event::ExchangePublishFailed => {
            if let Some(peer) = state.peer_found() {
                next.publish_attempts = next.publish_attempts.saturating_add(1);
                next.last_publish_attempt = Some(now);
                if next.publish_attempts >= PUBLISH_MAX_ATTEMPTS {
                    log::warn!("Exchange with {} not published, giving up", peer);
                    next.forget_peer(peer);
                    next.phase = Phase::GestureArmed;
                    fx.push(Effect::Receipt(Command::ProfileExchange, Status::Failure));
                }
            }
        }

        // DiscoveryStartFailed keeps HandshakeDetected; the start is retried
        // until the debounce window closes. Everything else is stale.
        other => log::debug!("Ignoring {:?} in {:?}", other, state.phase),
    }

    (next, fx)
}
