// Handshake Badge: Advertisement Wire Format
//
// Byte layout of the advertising data (23 bytes):
//
//   [0]      0x03          length of the name structure
//   [1]      0x09          AD type: complete local name
//   [2..4]   "EZ"          name marker, coarse pre-filter
//   [4..10]  identifier    6 bytes, build identifier
//   [10..14] event id      4 bytes
//   [14..23] ticket id     9 bytes
//
// The record is appended raw after the name structure. Fields shorter than
// their width are right-padded with spaces and trimmed again on parse.

use heapless::String;

use crate::config::ADV_NAME_MARKER;
use crate::error::RecordError;

pub const IDENTIFIER_LEN: usize = 6;
pub const EVENT_ID_LEN: usize = 4;
pub const TICKET_ID_LEN: usize = 9;
pub const RECORD_LEN: usize = IDENTIFIER_LEN + EVENT_ID_LEN + TICKET_ID_LEN;
pub const RECORD_OFFSET: usize = 2 + ADV_NAME_MARKER.len();
pub const ADV_DATA_LEN: usize = RECORD_OFFSET + RECORD_LEN;

const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
const PAD: u8 = b' ';

pub type Identifier = String<IDENTIFIER_LEN>;
pub type EventId = String<EVENT_ID_LEN>;
pub type TicketId = String<TICKET_ID_LEN>;

/// Copy `value` into a fixed-capacity field, refusing anything that would
/// not fit on the wire.
pub fn fixed_field<const N: usize>(field: &'static str, value: &str) -> Result<String<N>, RecordError> {
    let mut out = String::new();
    out.push_str(value).map_err(|_| RecordError::FieldTooLong {
        field,
        len: value.len(),
        max: N,
    })?;
    Ok(out)
}

pub fn ticket_id(value: &str) -> Result<TicketId, RecordError> {
    fixed_field("ticket id", value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertRecord {
    pub identifier: Identifier,
    pub event_id: EventId,
    pub ticket_id: TicketId,
}

impl AdvertRecord {
    pub fn new(identifier: &str, event_id: &str, ticket_id: &str) -> Result<Self, RecordError> {
        Ok(Self {
            identifier: fixed_field("identifier", identifier)?,
            event_id: fixed_field("event id", event_id)?,
            ticket_id: fixed_field("ticket id", ticket_id)?,
        })
    }

    /// Full advertising data: name structure followed by the raw record.
    pub fn encode(&self) -> [u8; ADV_DATA_LEN] {
        let mut out = [PAD; ADV_DATA_LEN];
        out[0] = (1 + ADV_NAME_MARKER.len()) as u8;
        out[1] = AD_TYPE_COMPLETE_NAME;
        out[2..RECORD_OFFSET].copy_from_slice(ADV_NAME_MARKER.as_bytes());

        let mut at = RECORD_OFFSET;
        for (field, width) in [
            (self.identifier.as_str(), IDENTIFIER_LEN),
            (self.event_id.as_str(), EVENT_ID_LEN),
            (self.ticket_id.as_str(), TICKET_ID_LEN),
        ] {
            out[at..at + field.len()].copy_from_slice(field.as_bytes());
            at += width;
        }
        out
    }

    /// Read the record at its fixed offset. `None` for short payloads or
    /// fields that are not valid UTF-8.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let record = payload.get(RECORD_OFFSET..ADV_DATA_LEN)?;
        let (identifier, rest) = record.split_at(IDENTIFIER_LEN);
        let (event_id, ticket_id) = rest.split_at(EVENT_ID_LEN);

        Some(Self {
            identifier: parse_field(identifier)?,
            event_id: parse_field(event_id)?,
            ticket_id: parse_field(ticket_id)?,
        })
    }
}

fn parse_field<const N: usize>(raw: &[u8]) -> Option<String<N>> {
    let text = core::str::from_utf8(raw).ok()?;
    let mut out = String::new();
    out.push_str(text.trim_end_matches(PAD as char)).ok()?;
    Some(out)
}

/// Local name carried by the first name structure, if any. Stops at the
/// first malformed length so trailing raw bytes are never misread.
pub fn advertised_name(payload: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i < payload.len() {
        let len = payload[i] as usize;
        if len == 0 || i + 1 + len > payload.len() {
            return None;
        }
        let ad_type = payload[i + 1];
        if ad_type == AD_TYPE_COMPLETE_NAME || ad_type == AD_TYPE_SHORT_NAME {
            return Some(&payload[i + 2..i + 1 + len]);
        }
        i += 1 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_byte_exact() {
        let record = AdvertRecord::new("HSBDG1", "E001", "TKT000042").unwrap();
        let adv = record.encode();
        assert_eq!(adv.len(), 23);
        assert_eq!(&adv[..4], &[0x03, 0x09, b'E', b'Z']);
        assert_eq!(&adv[4..10], b"HSBDG1");
        assert_eq!(&adv[10..14], b"E001");
        assert_eq!(&adv[14..23], b"TKT000042");
    }

    #[test]
    fn short_fields_are_padded_and_trimmed() {
        let adv = AdvertRecord::new("HSBDG1", "E1", "T2").unwrap().encode();
        assert_eq!(&adv[10..14], b"E1  ");
        assert_eq!(&adv[14..23], b"T2       ");

        let parsed = AdvertRecord::parse(&adv).unwrap();
        assert_eq!(parsed.event_id.as_str(), "E1");
        assert_eq!(parsed.ticket_id.as_str(), "T2");
    }

    #[test]
    fn oversized_field_is_refused() {
        let err = AdvertRecord::new("HSBDG1", "E001", "TICKET-0001").unwrap_err();
        assert_eq!(
            err,
            RecordError::FieldTooLong { field: "ticket id", len: 11, max: 9 }
        );
    }

    #[test]
    fn truncated_payload_does_not_parse() {
        let adv = AdvertRecord::new("HSBDG1", "E001", "TKT000042").unwrap().encode();
        assert!(AdvertRecord::parse(&adv[..ADV_DATA_LEN - 1]).is_none());
        assert!(AdvertRecord::parse(&[]).is_none());
    }

    #[test]
    fn invalid_utf8_does_not_parse() {
        let mut adv = AdvertRecord::new("HSBDG1", "E001", "TKT000042").unwrap().encode();
        adv[15] = 0xFF;
        assert!(AdvertRecord::parse(&adv).is_none());
    }

    #[test]
    fn name_is_read_from_first_structure() {
        let adv = AdvertRecord::new("HSBDG1", "E001", "TKT000042").unwrap().encode();
        assert_eq!(advertised_name(&adv), Some(&b"EZ"[..]));
    }

    #[test]
    fn name_found_after_flags_structure() {
        let payload = [0x02, 0x01, 0x06, 0x03, 0x08, b'E', b'Z'];
        assert_eq!(advertised_name(&payload), Some(&b"EZ"[..]));
    }

    #[test]
    fn malformed_structures_have_no_name() {
        assert_eq!(advertised_name(&[0x09, 0x09, b'E']), None);
        assert_eq!(advertised_name(&[0x00, 0x09]), None);
        assert_eq!(advertised_name(&[0x02, 0x01, 0x06]), None);
    }
}
