// Handshake Badge: MQTT Assignment Link
//
// Inbound messages land in the shared `Inbox` from the MQTT task; the main
// loop reads and acknowledges flags through `AssignmentLink`. Subscriptions
// and the availability announcement are (re)issued from `service` after
// every (re)connect, since the event callback cannot reach the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS};

use crate::config::*;
use crate::link::inbox::{availability_payload, exchange_payload, lock_inbox, receipt_payload};
use crate::link::{AssignmentLink, Command, Inbox, SharedInbox, Status, Topics};

#[derive(Clone)]
pub struct BrokerLink {
    client: Arc<Mutex<EspMqttClient<'static>>>,
    inbox: SharedInbox,
    topics: Topics,
    connected: Arc<AtomicBool>,
    subscribed: Arc<AtomicBool>,
}

impl BrokerLink {
    pub fn connect(device_id: &str, event_id: &str) -> anyhow::Result<Self> {
        let topics = Topics::new(device_id, event_id);
        let inbox: SharedInbox = Arc::new(Mutex::new(Inbox::default()));
        let connected = Arc::new(AtomicBool::new(false));
        let subscribed = Arc::new(AtomicBool::new(false));

        let config = MqttClientConfiguration {
            client_id: Some(device_id),
            username: (!MQTT_USERNAME.is_empty()).then_some(MQTT_USERNAME),
            password: (!MQTT_PASSWORD.is_empty()).then_some(MQTT_PASSWORD),
            ..Default::default()
        };

        let cb_inbox = Arc::clone(&inbox);
        let cb_topics = topics.clone();
        let cb_connected = Arc::clone(&connected);
        let cb_subscribed = Arc::clone(&subscribed);
        let client = EspMqttClient::new_cb(MQTT_BROKER_URL, &config, move |event: EspMqttEvent<'_>| {
            match event.payload() {
                EventPayload::Connected(_) => {
                    log::info!("MQTT connected");
                    cb_subscribed.store(false, Ordering::Release);
                    cb_connected.store(true, Ordering::Release);
                }
                EventPayload::Disconnected => {
                    log::warn!("MQTT disconnected");
                    cb_connected.store(false, Ordering::Release);
                }
                EventPayload::Received { topic: Some(topic), data, .. } => {
                    log::debug!("MQTT <- {}", topic);
                    lock_inbox(&cb_inbox).handle(&cb_topics, topic, data);
                }
                EventPayload::Error(e) => log::warn!("MQTT error: {:?}", e),
                _ => {}
            }
        })?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            inbox,
            topics,
            connected,
            subscribed,
        })
    }

    fn client(&self) -> MutexGuard<'_, EspMqttClient<'static>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, topic: &str, payload: &str) -> anyhow::Result<()> {
        anyhow::ensure!(self.connected.load(Ordering::Acquire), "broker not connected");
        self.client().publish(topic, QoS::AtLeastOnce, false, payload.as_bytes())?;
        Ok(())
    }

    /// Subscribe and announce after a (re)connect. Call every loop pass.
    pub fn service(&mut self) {
        if !self.connected.load(Ordering::Acquire) || self.subscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        for topic in self.topics.subscriptions() {
            if let Err(e) = self.client().subscribe(&topic, QoS::AtLeastOnce) {
                log::warn!("Subscribe to {} failed: {}", topic, e);
                self.subscribed.store(false, Ordering::Release);
                return;
            }
        }
        if let Err(e) = self.publish_receipt(Command::Connect, Status::Success) {
            log::warn!("Connect receipt not published: {:#}", e);
        }
        if let Err(e) = self.publish_availability() {
            log::warn!("Availability not published: {:#}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Consume a pending reboot request.
    pub fn take_reboot_request(&self) -> bool {
        std::mem::take(&mut lock_inbox(&self.inbox).reboot_requested)
    }
}

impl AssignmentLink for BrokerLink {
    fn is_assigned(&self) -> bool {
        lock_inbox(&self.inbox).ticket_id.is_some()
    }

    fn ticket_id(&self) -> Option<String> {
        lock_inbox(&self.inbox).ticket_id.clone()
    }

    fn ticket_reset_flag(&self) -> bool {
        lock_inbox(&self.inbox).ticket_reset
    }

    fn ack_ticket_reset(&mut self) {
        lock_inbox(&self.inbox).ticket_reset = false;
    }

    fn nfc_reset_flag(&self) -> bool {
        lock_inbox(&self.inbox).nfc_reset
    }

    fn ack_nfc_reset(&mut self) {
        lock_inbox(&self.inbox).nfc_reset = false;
    }

    fn profile_swap_flag(&self) -> bool {
        lock_inbox(&self.inbox).profile_swap
    }

    fn ack_profile_swap(&mut self) {
        lock_inbox(&self.inbox).profile_swap = false;
    }

    fn publish_receipt(&mut self, command: Command, status: Status) -> anyhow::Result<()> {
        self.publish(&self.topics.receipt(), &receipt_payload(command, status)?)
    }

    fn publish_availability(&mut self) -> anyhow::Result<()> {
        self.publish(&self.topics.availability(), &availability_payload(&self.topics)?)
    }

    fn publish_exchange(&mut self, peer_ticket_id: &str) -> anyhow::Result<()> {
        let own = self
            .ticket_id()
            .ok_or_else(|| anyhow::anyhow!("no ticket assigned"))?;
        self.publish(&self.topics.exchange(), &exchange_payload(&self.topics, &own, peer_ticket_id)?)
    }
}
