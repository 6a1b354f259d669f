// Handshake Badge: Orchestrator
//
// Owns every collaborator and drives them from a single polled `tick`.
// Decisions live in `machine::step`; this module gathers inputs, feeds them
// in as events and carries out the resulting effects.
//
// Tick order:
//   1. Service the haptic pulse.
//   2. Reset signals (reassignment wins and ends the tick).
//   3. Timers (debounce expiry, one-tick transitional phases).
//   4. Phase-specific polling (assignment, tag write, gesture, discovery,
//      exchange publish).

pub mod machine;

pub use machine::{DeviceState, Effect, Event, Phase};

use crate::discovery::advert::{fixed_field, ticket_id};
use crate::discovery::{AdvertRecord, Identifier, PeerDiscovery, Resolution, TicketId};
use crate::error::{FatalError, RecordError};
use crate::gesture::GestureClassifier;
use crate::haptic::Haptic;
use crate::link::{AssignmentLink, Command, Status};
use crate::tag::TagWriter;

/// Deployment constants the orchestrator stamps into adverts and the tag.
#[derive(Debug, Clone)]
pub struct Settings<'a> {
    pub identifier: &'a str,
    pub event_id: &'a str,
    pub tag_uri: &'a str,
}

impl Default for Settings<'static> {
    fn default() -> Self {
        Self {
            identifier: crate::config::DEVICE_IDENTIFIER,
            event_id: crate::config::EVENT_ID,
            tag_uri: crate::config::TAG_URI,
        }
    }
}

pub struct Orchestrator {
    state: DeviceState,
    identifier: Identifier,
    tag_uri: String,
    link: Box<dyn AssignmentLink>,
    tag: Box<dyn TagWriter>,
    haptic: Haptic,
    classifier: GestureClassifier,
    discovery: PeerDiscovery,
    /// Last ticket refused for not fitting the advert; reported once.
    rejected_ticket: Option<String>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings<'_>,
        link: Box<dyn AssignmentLink>,
        tag: Box<dyn TagWriter>,
        haptic: Haptic,
        classifier: GestureClassifier,
        discovery: PeerDiscovery,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            state: DeviceState::new(fixed_field("event id", settings.event_id)?),
            identifier: fixed_field("identifier", settings.identifier)?,
            tag_uri: settings.tag_uri.to_owned(),
            link,
            tag,
            haptic,
            classifier,
            discovery,
            rejected_ticket: None,
        })
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn phase(&self) -> &Phase {
        &self.state.phase
    }

    pub fn handshake_detected(&self) -> bool {
        self.state.handshake_detected()
    }

    /// Check the tag chip, blank it, and announce the device to the backend.
    pub fn start(&mut self) -> Result<(), FatalError> {
        if !self.tag.probe() {
            log::error!("NFC tag not responding");
            return Err(FatalError::HardwareAbsent("nfc tag"));
        }
        if let Err(e) = self.tag.erase() {
            log::warn!("Tag erase failed: {:#}", e);
        }
        if let Err(e) = self.link.publish_availability() {
            log::warn!("Availability not published: {:#}", e);
        }
        log::info!("Badge {} ready for event {}", self.identifier, self.state.event_id);
        Ok(())
    }

    /// One pass of the main loop. Only hardware absence is an error.
    pub fn tick(&mut self, now: u32) -> Result<(), FatalError> {
        self.haptic.service(now);

        if self.link.ticket_reset_flag() {
            self.apply(Event::Reassigned, now)?;
            return Ok(());
        }
        if self.link.nfc_reset_flag() {
            self.apply(Event::TagReset, now)?;
        }
        if self.link.profile_swap_flag() {
            self.apply(Event::ProfileSwap, now)?;
        }

        self.apply(Event::Tick, now)?;

        match self.state.phase.clone() {
            Phase::Unassigned => self.poll_assignment(now),
            Phase::TagPending => self.poll_tag_write(now),
            Phase::GestureArmed => self.poll_gesture(now),
            Phase::HandshakeDetected => self.poll_discovery_start(now),
            Phase::DiscoveryActive => self.poll_discovery(now),
            Phase::PeerFound(peer) => self.poll_exchange(&peer, now),
            Phase::TagWritten | Phase::Exchanged => Ok(()),
        }
    }

    fn poll_assignment(&mut self, now: u32) -> Result<(), FatalError> {
        if !self.link.is_assigned() {
            return Ok(());
        }
        let Some(raw) = self.link.ticket_id().filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        match ticket_id(&raw) {
            Ok(ticket) => {
                self.rejected_ticket = None;
                log::info!("Assigned ticket {}", ticket);
                self.apply(Event::Assigned(ticket), now)
            }
            Err(e) => {
                if self.rejected_ticket.as_deref() != Some(raw.as_str()) {
                    log::warn!("Refusing ticket {:?}: {}", raw, e);
                    self.publish_receipt(Command::AssignDevice, Status::Failure);
                    self.rejected_ticket = Some(raw);
                }
                Ok(())
            }
        }
    }

    fn poll_tag_write(&mut self, now: u32) -> Result<(), FatalError> {
        if !self.state.tag_write_due(now) {
            return Ok(());
        }
        match self.tag.write_uri(&self.tag_uri) {
            Ok(()) => {
                log::info!("Tag written: {}", self.tag_uri);
                self.apply(Event::TagWriteSucceeded, now)
            }
            Err(e) => {
                log::warn!("Tag write failed: {:#}", e);
                self.apply(Event::TagWriteFailed, now)
            }
        }
    }

    fn poll_gesture(&mut self, now: u32) -> Result<(), FatalError> {
        if !self.state.gesture_armed() {
            return Ok(());
        }
        self.classifier.collect_sample(now);
        match self.classifier.classify(now) {
            Some(result) => self.apply(Event::Gesture(result), now),
            None => Ok(()),
        }
    }

    fn poll_discovery_start(&mut self, now: u32) -> Result<(), FatalError> {
        let Some(own) = self.own_record() else {
            return Ok(());
        };
        match self.discovery.start(&own, now) {
            Ok(()) => self.apply(Event::DiscoveryStarted, now),
            Err(e) => {
                log::warn!("Discovery start failed: {:#}", e);
                self.apply(Event::DiscoveryStartFailed, now)
            }
        }
    }

    fn poll_discovery(&mut self, now: u32) -> Result<(), FatalError> {
        match self.discovery.resolve(now) {
            Resolution::Pending => Ok(()),
            Resolution::Peer(peer) => self.apply(Event::DiscoveryResolved(Some(peer)), now),
            Resolution::NoPeer | Resolution::Idle => self.apply(Event::DiscoveryResolved(None), now),
        }
    }

    fn poll_exchange(&mut self, peer: &TicketId, now: u32) -> Result<(), FatalError> {
        if !self.state.exchange_publish_due(now) {
            return Ok(());
        }
        match self.link.publish_exchange(peer) {
            Ok(()) => {
                log::info!("Profile exchange published with {}", peer);
                self.apply(Event::ExchangePublished, now)
            }
            Err(e) => {
                log::warn!("Exchange publish failed: {:#}", e);
                self.apply(Event::ExchangePublishFailed, now)
            }
        }
    }

    fn own_record(&self) -> Option<AdvertRecord> {
        Some(AdvertRecord {
            identifier: self.identifier.clone(),
            event_id: self.state.event_id.clone(),
            ticket_id: self.state.ticket_id.clone()?,
        })
    }

    fn apply(&mut self, event: Event, now: u32) -> Result<(), FatalError> {
        let (next, effects) = machine::step(&self.state, event, now);
        if next.phase != self.state.phase {
            log::info!("{:?} -> {:?}", self.state.phase, next.phase);
        }
        self.state = next;
        effects.into_iter().try_for_each(|e| self.execute(e, now))
    }

    fn execute(&mut self, effect: Effect, now: u32) -> Result<(), FatalError> {
        match effect {
            Effect::Receipt(command, status) => self.publish_receipt(command, status),
            Effect::Pulse { power, duration_ms } => self.haptic.activate(power, duration_ms, now),
            Effect::InitClassifier => self.classifier.init()?,
            Effect::ClearWindow => self.classifier.reset(),
            Effect::AbortDiscovery => self.discovery.abort(),
            Effect::EraseTag => {
                if let Err(e) = self.tag.erase() {
                    log::warn!("Tag erase failed: {:#}", e);
                }
            }
            Effect::AckTicketReset => self.link.ack_ticket_reset(),
            Effect::AckNfcReset => self.link.ack_nfc_reset(),
            Effect::AckProfileSwap => self.link.ack_profile_swap(),
        }
        Ok(())
    }

    fn publish_receipt(&mut self, command: Command, status: Status) {
        if let Err(e) = self.link.publish_receipt(command, status) {
            log::warn!("Receipt {} not published: {:#}", command.as_str(), e);
        }
    }
}
