//! Peer discovery over short-range radio: advertisement wire format and the
//! windowed RSSI arbitration protocol.

pub mod advert;
pub mod protocol;

pub use advert::{AdvertRecord, EventId, Identifier, TicketId};
pub use protocol::{
    Candidate, DiscoveryObserver, PeerDiscovery, Radio, Resolution, ScanObserver,
};
