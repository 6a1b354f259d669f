//! End-to-end runs of the orchestrator against recording fakes: assignment,
//! tag write, gesture detection, discovery arbitration, exchange and the
//! reset signals.

use std::cell::RefCell;
use std::f32::consts::PI;
use std::rc::Rc;

use handshake_badge::config::*;
use handshake_badge::discovery::{AdvertRecord, DiscoveryObserver, PeerDiscovery, Radio, ScanObserver};
use handshake_badge::events::SensorData;
use handshake_badge::gesture::{GestureClassifier, InertialSensor, SignatureScorer};
use handshake_badge::haptic::{Haptic, MotorOutput};
use handshake_badge::link::{AssignmentLink, Command, Status};
use handshake_badge::orchestrator::Phase;
use handshake_badge::tag::TagWriter;
use handshake_badge::{FatalError, Orchestrator, Settings};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LinkState {
    ticket: Option<String>,
    ticket_reset: bool,
    nfc_reset: bool,
    profile_swap: bool,
    receipts: Vec<(Command, Status)>,
    exchanges: Vec<String>,
    exchange_attempts: usize,
    exchange_failures_left: u32,
    announcements: usize,
}

struct FakeLink(Rc<RefCell<LinkState>>);

impl AssignmentLink for FakeLink {
    fn is_assigned(&self) -> bool {
        self.0.borrow().ticket.is_some()
    }
    fn ticket_id(&self) -> Option<String> {
        self.0.borrow().ticket.clone()
    }
    fn ticket_reset_flag(&self) -> bool {
        self.0.borrow().ticket_reset
    }
    fn ack_ticket_reset(&mut self) {
        self.0.borrow_mut().ticket_reset = false;
    }
    fn nfc_reset_flag(&self) -> bool {
        self.0.borrow().nfc_reset
    }
    fn ack_nfc_reset(&mut self) {
        self.0.borrow_mut().nfc_reset = false;
    }
    fn profile_swap_flag(&self) -> bool {
        self.0.borrow().profile_swap
    }
    fn ack_profile_swap(&mut self) {
        self.0.borrow_mut().profile_swap = false;
    }
    fn publish_receipt(&mut self, command: Command, status: Status) -> anyhow::Result<()> {
        self.0.borrow_mut().receipts.push((command, status));
        Ok(())
    }
    fn publish_availability(&mut self) -> anyhow::Result<()> {
        self.0.borrow_mut().announcements += 1;
        Ok(())
    }
    fn publish_exchange(&mut self, peer_ticket_id: &str) -> anyhow::Result<()> {
        let mut link = self.0.borrow_mut();
        link.exchange_attempts += 1;
        if link.exchange_failures_left > 0 {
            link.exchange_failures_left -= 1;
            anyhow::bail!("broker unreachable");
        }
        link.exchanges.push(peer_ticket_id.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct TagState {
    absent: bool,
    failures_left: u32,
    writes: Vec<String>,
    erases: usize,
}

struct FakeTag(Rc<RefCell<TagState>>);

impl TagWriter for FakeTag {
    fn probe(&mut self) -> bool {
        !self.0.borrow().absent
    }
    fn write_uri(&mut self, uri: &str) -> anyhow::Result<()> {
        let mut tag = self.0.borrow_mut();
        if tag.failures_left > 0 {
            tag.failures_left -= 1;
            anyhow::bail!("no ack from tag");
        }
        tag.writes.push(uri.to_owned());
        Ok(())
    }
    fn erase(&mut self) -> anyhow::Result<()> {
        self.0.borrow_mut().erases += 1;
        Ok(())
    }
}

struct FakeMotor(Rc<RefCell<Vec<u8>>>);

impl MotorOutput for FakeMotor {
    fn set_duty(&mut self, duty: u8) {
        self.0.borrow_mut().push(duty);
    }
}

struct FakeRadio(Rc<RefCell<Vec<&'static str>>>);

impl Radio for FakeRadio {
    fn start_advertising(&mut self, _payload: &[u8]) -> anyhow::Result<()> {
        self.0.borrow_mut().push("adv+");
        Ok(())
    }
    fn stop_advertising(&mut self) {
        self.0.borrow_mut().push("adv-");
    }
    fn start_scanning(&mut self) -> anyhow::Result<()> {
        self.0.borrow_mut().push("scan+");
        Ok(())
    }
    fn stop_scanning(&mut self) {
        self.0.borrow_mut().push("scan-");
    }
}

/// Pumps the hand at 3 Hz along y, the way a handshake does.
struct ShakingHand {
    present: bool,
    n: usize,
}

impl InertialSensor for ShakingHand {
    fn init(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.present, "no IMU on the bus");
        Ok(())
    }
    fn read(&mut self) -> anyhow::Result<SensorData> {
        let t = self.n as f32 * SAMPLE_INTERVAL_MS as f32 / 1000.0;
        self.n += 1;
        Ok(SensorData {
            ax: 0.1,
            ay: 4.0 * (2.0 * PI * 3.0 * t + 0.3).sin(),
            az: 0.0,
            gx: 20.0,
            gy: 0.0,
            gz: 0.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

const TICK_MS: u32 = 10;

struct Rig {
    badge: Orchestrator,
    observer: DiscoveryObserver,
    link: Rc<RefCell<LinkState>>,
    tag: Rc<RefCell<TagState>>,
    motor: Rc<RefCell<Vec<u8>>>,
    radio: Rc<RefCell<Vec<&'static str>>>,
    now: u32,
}

impl Rig {
    fn new() -> Self {
        Self::build(true, TagState::default())
    }

    fn build(imu_present: bool, tag: TagState) -> Self {
        let link = Rc::new(RefCell::new(LinkState {
            ticket: Some("T0".into()),
            ..Default::default()
        }));
        let tag = Rc::new(RefCell::new(tag));
        let motor = Rc::new(RefCell::new(Vec::new()));
        let radio = Rc::new(RefCell::new(Vec::new()));

        let discovery = PeerDiscovery::new(Box::new(FakeRadio(Rc::clone(&radio))));
        let observer = discovery.observer();
        let classifier = GestureClassifier::new(
            Box::new(ShakingHand { present: imu_present, n: 0 }),
            Box::new(SignatureScorer::new()),
        );

        let badge = Orchestrator::new(
            Settings::default(),
            Box::new(FakeLink(Rc::clone(&link))),
            Box::new(FakeTag(Rc::clone(&tag))),
            Haptic::new(Box::new(FakeMotor(Rc::clone(&motor)))),
            classifier,
            discovery,
        )
        .unwrap();

        Self { badge, observer, link, tag, motor, radio, now: 0 }
    }

    fn tick(&mut self) -> Result<(), FatalError> {
        let result = self.badge.tick(self.now);
        self.now += TICK_MS;
        result
    }

    fn tick_at(&mut self, now: u32) {
        self.now = now;
        self.tick().unwrap();
    }

    /// Tick until `done` holds; returns the instant of the tick that made it so.
    fn run_until(&mut self, limit_ms: u32, done: impl Fn(&Orchestrator) -> bool) -> u32 {
        let deadline = self.now + limit_ms;
        while self.now < deadline {
            let at = self.now;
            self.tick().unwrap();
            if done(&self.badge) {
                return at;
            }
        }
        panic!("condition not reached, stuck in {:?}", self.badge.phase());
    }

    fn phase(&self) -> Phase {
        self.badge.phase().clone()
    }

    fn advertise(&self, ticket: &str, rssi: i32) {
        let record = AdvertRecord::new(DEVICE_IDENTIFIER, EVENT_ID, ticket).unwrap();
        self.observer.on_observation(&record.encode(), rssi);
    }

    fn receipts(&self) -> Vec<(Command, Status)> {
        self.link.borrow().receipts.clone()
    }

    /// Start, assign, write the tag and detect the first handshake.
    fn to_handshake(&mut self) -> u32 {
        self.badge.start().unwrap();
        self.run_until(2000, |b| *b.phase() == Phase::GestureArmed);
        self.run_until(3000, |b| *b.phase() == Phase::HandshakeDetected)
    }

    fn to_discovery(&mut self) -> u32 {
        let detected = self.to_handshake();
        self.run_until(100, |b| *b.phase() == Phase::DiscoveryActive);
        detected
    }
}

fn peer_found(b: &Orchestrator) -> bool {
    matches!(b.phase(), Phase::PeerFound(_))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn strongest_peer_is_exchanged_exactly_once() {
    let mut rig = Rig::new();
    rig.to_discovery();
    assert_eq!(*rig.radio.borrow(), ["adv+", "scan+"]);

    rig.advertise("T1", -60);
    rig.advertise("T2", -40);
    rig.advertise("T3", -55);
    rig.advertise("T0", -20); // our own ticket echoed back
    rig.advertise("T4", -80); // too far away

    rig.run_until(2 * COLLECTION_WINDOW_MS, peer_found);
    assert_eq!(rig.badge.state().peer_found().map(|p| p.as_str()), Some("T2"));
    assert_eq!(*rig.radio.borrow(), ["adv+", "scan+", "scan-", "adv-"]);

    rig.run_until(100, |b| *b.phase() == Phase::Exchanged);
    assert!(rig.badge.state().exchanged);
    assert!(!rig.badge.handshake_detected());
    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::GestureArmed);

    // Keep shaking: later handshakes find nobody new.
    for _ in 0..400 {
        rig.tick().unwrap();
    }
    assert_eq!(rig.link.borrow().exchanges, ["T2"]);

    let receipts = rig.receipts();
    let count = |c: Command| receipts.iter().filter(|r| **r == (c, Status::Success)).count();
    assert_eq!(count(Command::AssignDevice), 1);
    assert_eq!(count(Command::WriteNfc), 1);
    assert_eq!(count(Command::ProfileExchange), 1);
    assert!(count(Command::Handshake) >= 2);
}

#[test]
fn exchange_publish_retries_wait_between_attempts() {
    let mut rig = Rig::new();
    rig.link.borrow_mut().exchange_failures_left = 2;
    rig.to_discovery();
    rig.advertise("T2", -40);
    rig.run_until(2 * COLLECTION_WINDOW_MS, peer_found);

    for _ in 0..PUBLISH_RETRY_MS / TICK_MS {
        rig.tick().unwrap();
    }
    assert_eq!(rig.link.borrow().exchange_attempts, 1);
    rig.tick().unwrap();
    assert_eq!(rig.link.borrow().exchange_attempts, 2);

    rig.run_until(PUBLISH_RETRY_MS + 100, |b| *b.phase() == Phase::Exchanged);
    let link = rig.link.borrow();
    assert_eq!(link.exchange_attempts, 3);
    assert_eq!(link.exchanges, ["T2"]);
}

#[test]
fn start_announces_and_blanks_the_tag() {
    let mut rig = Rig::new();
    rig.badge.start().unwrap();
    assert_eq!(rig.link.borrow().announcements, 1);
    assert_eq!(rig.tag.borrow().erases, 1);
}

#[test]
fn assignment_pulses_and_writes_the_tag() {
    let mut rig = Rig::new();
    rig.badge.start().unwrap();

    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::TagPending);
    assert_eq!(*rig.motor.borrow(), [255]);

    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::TagWritten);
    assert!(rig.badge.state().tag_written);
    assert_eq!(rig.tag.borrow().writes, [TAG_URI]);

    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::GestureArmed);

    rig.tick_at(ASSIGN_PULSE_MS);
    assert_eq!(*rig.motor.borrow(), [255, 0]);
}

#[test]
fn tag_write_is_retried_after_failures() {
    let mut rig = Rig::build(true, TagState { failures_left: 2, ..Default::default() });
    rig.badge.start().unwrap();
    rig.tick_at(0);
    rig.tick_at(10);
    assert_eq!(rig.phase(), Phase::TagPending);
    rig.tick_at(10 + TAG_WRITE_RETRY_MS - 1);
    assert_eq!(rig.phase(), Phase::TagPending);
    rig.tick_at(10 + TAG_WRITE_RETRY_MS);
    assert_eq!(rig.phase(), Phase::TagPending);
    rig.tick_at(10 + 2 * TAG_WRITE_RETRY_MS);
    assert_eq!(rig.phase(), Phase::TagWritten);
    assert_eq!(rig.tag.borrow().writes.len(), 1);
}

#[test]
fn debounce_holds_for_exactly_its_window() {
    let mut rig = Rig::new();
    let detected = rig.to_discovery();

    // Nobody around: the window closes empty.
    rig.run_until(2 * COLLECTION_WINDOW_MS, |b| *b.phase() == Phase::GestureArmed);
    assert!(rig.badge.handshake_detected());

    rig.tick_at(detected + HANDSHAKE_DEBOUNCE_MS - 1);
    assert!(rig.badge.handshake_detected());
    rig.tick_at(detected + HANDSHAKE_DEBOUNCE_MS);
    assert!(!rig.badge.handshake_detected());
    assert!(rig.link.borrow().exchanges.is_empty());
}

#[test]
fn reassignment_during_discovery_resets_within_one_tick() {
    let mut rig = Rig::new();
    rig.to_discovery();
    rig.advertise("T2", -40);

    {
        let mut link = rig.link.borrow_mut();
        link.ticket = Some("T5".into());
        link.ticket_reset = true;
    }
    rig.tick().unwrap();

    let state = rig.badge.state();
    assert_eq!(state.phase, Phase::Unassigned);
    assert!(!state.tag_written && !state.exchanged && !state.is_assigned());
    assert!(!state.handshake_detected());
    assert!(!rig.link.borrow().ticket_reset);
    assert_eq!(*rig.radio.borrow(), ["adv+", "scan+", "scan-", "adv-"]);
    assert!(rig
        .receipts()
        .contains(&(Command::TicketReassignment, Status::Success)));

    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::TagPending);
    assert_eq!(rig.badge.state().ticket_id.as_deref(), Some("T5"));
    assert!(rig.link.borrow().exchanges.is_empty());
}

#[test]
fn tag_reset_rewrites_the_tag() {
    let mut rig = Rig::new();
    rig.badge.start().unwrap();
    rig.run_until(2000, |b| *b.phase() == Phase::GestureArmed);

    rig.tag.borrow_mut().failures_left = 1;
    rig.link.borrow_mut().nfc_reset = true;
    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::TagPending);
    assert!(!rig.badge.state().tag_written);
    assert!(!rig.link.borrow().nfc_reset);
    assert_eq!(rig.tag.borrow().erases, 2);

    rig.tick_at(rig.now + TAG_WRITE_RETRY_MS);
    assert_eq!(rig.phase(), Phase::TagWritten);
    assert_eq!(rig.tag.borrow().writes.len(), 2);
    assert!(rig.receipts().contains(&(Command::NfcReset, Status::Success)));
}

#[test]
fn profile_swap_notification_pulses_without_changing_phase() {
    let mut rig = Rig::new();
    rig.badge.start().unwrap();
    rig.run_until(2000, |b| *b.phase() == Phase::GestureArmed);
    rig.motor.borrow_mut().clear();

    rig.link.borrow_mut().profile_swap = true;
    let at = rig.now;
    rig.tick().unwrap();
    assert_eq!(rig.phase(), Phase::GestureArmed);
    assert!(!rig.link.borrow().profile_swap);
    assert_eq!(*rig.motor.borrow(), [255]);

    rig.tick_at(at + PROFILE_SWAP_PULSE_MS);
    assert_eq!(*rig.motor.borrow(), [255, 0]);
}

#[test]
fn overlong_ticket_is_refused_once() {
    let mut rig = Rig::new();
    rig.link.borrow_mut().ticket = Some("TKT0000001".into());
    rig.badge.start().unwrap();
    for _ in 0..5 {
        rig.tick().unwrap();
    }
    assert_eq!(rig.phase(), Phase::Unassigned);
    assert_eq!(rig.receipts(), [(Command::AssignDevice, Status::Failure)]);
}

#[test]
fn missing_tag_chip_is_fatal() {
    let mut rig = Rig::build(true, TagState { absent: true, ..Default::default() });
    assert_eq!(rig.badge.start(), Err(FatalError::HardwareAbsent("nfc tag")));
}

#[test]
fn missing_imu_is_fatal_on_assignment() {
    let mut rig = Rig::build(false, TagState::default());
    rig.badge.start().unwrap();
    assert_eq!(rig.tick(), Err(FatalError::HardwareAbsent("inertial sensor")));
}
