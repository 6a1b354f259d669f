// Handshake Badge: Peer Discovery Protocol
//
// Idle -> Active (advertising + scanning) -> resolved -> Idle
//
// The radio stack delivers scan results on its own task through
// `ScanObserver::on_observation`, while the main loop calls `resolve` and
// `abort`. The collection state is the only thing both sides touch and it
// lives behind one mutex; every critical section is a handful of compares
// and at most one push.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{ADV_NAME_MARKER, COLLECTION_WINDOW_MS, MAX_CANDIDATES, RSSI_THRESHOLD_DBM};
use crate::discovery::advert::{advertised_name, AdvertRecord, TicketId};
use crate::timing::Deadline;

/// Short-range radio: broadcast one advertisement and listen passively.
pub trait Radio {
    fn start_advertising(&mut self, adv_data: &[u8]) -> anyhow::Result<()>;
    fn stop_advertising(&mut self);
    fn start_scanning(&mut self) -> anyhow::Result<()>;
    fn stop_scanning(&mut self);
}

/// Capability handed to the radio stack at start-up. Called for every
/// advertisement received, from the radio's execution context.
pub trait ScanObserver: Send + Sync {
    fn on_observation(&self, payload: &[u8], rssi: i32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ticket_id: TicketId,
    pub rssi: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Discovery was never started or has already resolved.
    Idle,
    /// The collection window is still open.
    Pending,
    NoPeer,
    Peer(TicketId),
}

/// Strongest candidate; the earliest inserted wins ties.
pub fn strongest(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<&Candidate> = None;
    for c in candidates {
        match best {
            Some(b) if c.rssi <= b.rssi => {}
            _ => best = Some(c),
        }
    }
    best
}

struct Session {
    own: AdvertRecord,
    window: Deadline,
}

struct Collection {
    session: Option<Session>,
    candidates: heapless::Vec<Candidate, MAX_CANDIDATES>,
    rssi_threshold: i32,
}

fn lock(shared: &Mutex<Collection>) -> MutexGuard<'_, Collection> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Radio-side handle
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DiscoveryObserver {
    shared: Arc<Mutex<Collection>>,
}

impl ScanObserver for DiscoveryObserver {
    fn on_observation(&self, payload: &[u8], rssi: i32) {
        if advertised_name(payload) != Some(ADV_NAME_MARKER.as_bytes()) {
            return;
        }
        let Some(record) = AdvertRecord::parse(payload) else {
            return;
        };

        let mut guard = lock(&self.shared);
        let collection = &mut *guard;
        let Some(session) = &collection.session else {
            return;
        };

        if record.identifier != session.own.identifier
            || record.event_id != session.own.event_id
            || rssi <= collection.rssi_threshold
        {
            return;
        }
        if record.ticket_id == session.own.ticket_id {
            return;
        }
        if collection.candidates.iter().any(|c| c.ticket_id == record.ticket_id) {
            return;
        }

        let candidate = Candidate { ticket_id: record.ticket_id.clone(), rssi };
        match collection.candidates.push(candidate) {
            Ok(()) => log::debug!("Peer candidate {} at {} dBm", record.ticket_id, rssi),
            Err(c) => log::debug!("Candidate set full, dropping {}", c.ticket_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Main-loop side
// ---------------------------------------------------------------------------

pub struct PeerDiscovery {
    radio: Box<dyn Radio>,
    shared: Arc<Mutex<Collection>>,
    window_ms: u32,
}

impl PeerDiscovery {
    pub fn new(radio: Box<dyn Radio>) -> Self {
        Self {
            radio,
            shared: Arc::new(Mutex::new(Collection {
                session: None,
                candidates: heapless::Vec::new(),
                rssi_threshold: RSSI_THRESHOLD_DBM,
            })),
            window_ms: COLLECTION_WINDOW_MS,
        }
    }

    /// Applies to every observer handle, including ones already registered.
    pub fn with_rssi_threshold(self, dbm: i32) -> Self {
        lock(&self.shared).rssi_threshold = dbm;
        self
    }

    pub fn with_window_ms(mut self, ms: u32) -> Self {
        self.window_ms = ms;
        self
    }

    /// Handle to register with the radio stack.
    pub fn observer(&self) -> DiscoveryObserver {
        DiscoveryObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared).session.is_some()
    }

    pub fn candidate_count(&self) -> usize {
        lock(&self.shared).candidates.len()
    }

    /// Advertise `own` and scan for peers. The collection window opens now.
    pub fn start(&mut self, own: &AdvertRecord, now: u32) -> anyhow::Result<()> {
        self.abort();

        {
            let mut c = lock(&self.shared);
            c.candidates.clear();
            c.session = Some(Session {
                own: own.clone(),
                window: Deadline::starting_at(now, self.window_ms),
            });
        }

        let adv = own.encode();
        let started = self
            .radio
            .start_advertising(&adv)
            .and_then(|()| self.radio.start_scanning());
        if let Err(e) = started {
            self.abort();
            return Err(e);
        }

        log::info!(
            "Discovery started for ticket {} (window {} ms)",
            own.ticket_id,
            self.window_ms
        );
        Ok(())
    }

    /// Once the window has elapsed, stop the radio and pick the strongest
    /// candidate.
    pub fn resolve(&mut self, now: u32) -> Resolution {
        let winner = {
            let mut guard = lock(&self.shared);
            let c = &mut *guard;
            match &c.session {
                None => return Resolution::Idle,
                Some(s) if !s.window.has_elapsed(now) => return Resolution::Pending,
                Some(_) => {}
            }
            c.session = None;
            let winner = strongest(&c.candidates).cloned();
            c.candidates.clear();
            winner
        };

        self.stop_radio();

        match winner {
            Some(peer) => {
                log::info!("Strongest peer: {} at {} dBm", peer.ticket_id, peer.rssi);
                Resolution::Peer(peer.ticket_id)
            }
            None => {
                log::info!("No peer detected");
                Resolution::NoPeer
            }
        }
    }

    /// Stop the radio and drop all state. Safe to call when idle.
    pub fn abort(&mut self) {
        let was_active = {
            let mut c = lock(&self.shared);
            c.candidates.clear();
            c.session.take().is_some()
        };
        if was_active {
            self.stop_radio();
            log::info!("Discovery aborted");
        }
    }

    fn stop_radio(&mut self) {
        self.radio.stop_scanning();
        self.radio.stop_advertising();
    }
}
