// Handshake Badge: NFC Tag Contents
//
// The tag carries one NDEF URI record behind a Type 5 capability container.
// Encoding is done here; the chip driver only moves bytes.

/// Persistent tag. Writes are slow and can fail transiently.
pub trait TagWriter {
    /// Whether the chip answers on the bus.
    fn probe(&mut self) -> bool;

    fn write_uri(&mut self, uri: &str) -> anyhow::Result<()>;

    /// Zero user memory and restore an empty capability container.
    fn erase(&mut self) -> anyhow::Result<()>;
}

/// 8-byte capability container: magic, version 1.0, no read/write limits,
/// MLEN 0x03FF (8 KB of user memory).
pub const CAPABILITY_CONTAINER: [u8; 8] = [0xE2, 0x40, 0x00, 0x01, 0x00, 0x00, 0x03, 0xFF];

const TLV_NDEF_MESSAGE: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;
const RECORD_HEADER_SHORT_WELL_KNOWN: u8 = 0xD1; // MB | ME | SR | TNF=1
const RECORD_TYPE_URI: u8 = b'U';

/// URI identifier codes (NFC Forum RTD URI). Longest prefixes first.
const URI_PREFIXES: [(&str, u8); 4] = [
    ("https://www.", 0x02),
    ("http://www.", 0x01),
    ("https://", 0x04),
    ("http://", 0x03),
];

fn abbreviate(uri: &str) -> (u8, &str) {
    URI_PREFIXES
        .iter()
        .find_map(|&(prefix, code)| uri.strip_prefix(prefix).map(|rest| (code, rest)))
        .unwrap_or((0x00, uri))
}

/// NDEF message TLV holding a single short URI record, terminated.
pub fn ndef_uri_tlv(uri: &str) -> anyhow::Result<Vec<u8>> {
    let (code, rest) = abbreviate(uri);
    let payload_len = 1 + rest.len();
    anyhow::ensure!(payload_len <= u8::MAX as usize, "URI too long for a short record ({} bytes)", uri.len());

    let mut record = Vec::with_capacity(4 + payload_len);
    record.extend_from_slice(&[RECORD_HEADER_SHORT_WELL_KNOWN, 1, payload_len as u8, RECORD_TYPE_URI, code]);
    record.extend_from_slice(rest.as_bytes());

    let mut tlv = Vec::with_capacity(record.len() + 5);
    tlv.push(TLV_NDEF_MESSAGE);
    if record.len() < 0xFF {
        tlv.push(record.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(record.len() as u16).to_be_bytes());
    }
    tlv.extend_from_slice(&record);
    tlv.push(TLV_TERMINATOR);
    Ok(tlv)
}

/// Complete user-memory image starting at address 0.
pub fn tag_image(uri: &str) -> anyhow::Result<Vec<u8>> {
    let tlv = ndef_uri_tlv(uri)?;
    let mut image = Vec::with_capacity(CAPABILITY_CONTAINER.len() + tlv.len());
    image.extend_from_slice(&CAPABILITY_CONTAINER);
    image.extend_from_slice(&tlv);
    Ok(image)
}

/// Capability container plus an empty NDEF message, zero-filled to `len`.
pub fn blank_image(len: usize) -> Vec<u8> {
    let mut image = Vec::with_capacity(len.max(CAPABILITY_CONTAINER.len() + 3));
    image.extend_from_slice(&CAPABILITY_CONTAINER);
    image.extend_from_slice(&[TLV_NDEF_MESSAGE, 0x00, TLV_TERMINATOR]);
    if image.len() < len {
        image.resize(len, 0x00);
    }
    image
}
