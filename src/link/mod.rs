//! Backend link: the assignment provider the orchestrator consumes and the
//! topic/payload conventions of the broker behind it.

pub mod inbox;

pub use inbox::{Inbox, SharedInbox, Topics};

/// Command names used in status receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    AssignDevice,
    WriteNfc,
    Handshake,
    ProfileExchange,
    TicketReassignment,
    NfcReset,
    Reboot,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::AssignDevice => "assign device",
            Self::WriteNfc => "write NFC",
            Self::Handshake => "handshake",
            Self::ProfileExchange => "profile exchange",
            Self::TicketReassignment => "ticket_reassignment",
            Self::NfcReset => "nfc_reset",
            Self::Reboot => "reboot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Acknowledged,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Acknowledged => "acknowledged",
        }
    }
}

/// Broker-facing device id: the station MAC as upper-case hex pairs.
pub fn device_id_from_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Assignment provider as seen from the device. Flags are raised by the
/// backend asynchronously and stay raised until acknowledged.
pub trait AssignmentLink {
    fn is_assigned(&self) -> bool;
    fn ticket_id(&self) -> Option<String>;

    fn ticket_reset_flag(&self) -> bool;
    fn ack_ticket_reset(&mut self);
    fn nfc_reset_flag(&self) -> bool;
    fn ack_nfc_reset(&mut self);
    fn profile_swap_flag(&self) -> bool;
    fn ack_profile_swap(&mut self);

    fn publish_receipt(&mut self, command: Command, status: Status) -> anyhow::Result<()>;
    fn publish_availability(&mut self) -> anyhow::Result<()>;
    fn publish_exchange(&mut self, peer_ticket_id: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_formatting() {
        assert_eq!(
            device_id_from_mac([0xAA, 0xbb, 0x0c, 0x00, 0x01, 0xff]),
            "AA:BB:0C:00:01:FF"
        );
    }

    #[test]
    fn receipt_command_names() {
        assert_eq!(Command::AssignDevice.as_str(), "assign device");
        assert_eq!(Command::TicketReassignment.as_str(), "ticket_reassignment");
        assert_eq!(Status::Acknowledged.as_str(), "acknowledged");
    }
}
