//! Note metadata layout.
//!
//! Offsets are relative to the start of the metadata buffer and every offset
//! field is a 32-byte big-endian word:
//!
//! ```text
//! 0x00..0x21  ephemeral key (compressed point)
//! 0x21..0x41  approved-addresses offset
//! 0x41..0x61  encrypted-view-keys offset
//! 0x61..0x81  app-data offset
//! 0x81..      approved addresses | encrypted view keys | app data
//! ```
//!
//! The approved-addresses section is a count word followed by that many
//! address words, each holding an [`Address`] in its low 20 bytes.

use alloc::vec::Vec;

use crate::Address;

pub const EPHEMERAL_KEY_LEN: usize = 33;
pub const WORD_LEN: usize = 32;
/// Ephemeral key plus the three offset words.
pub const METADATA_HEADER_LEN: usize = EPHEMERAL_KEY_LEN + 3 * WORD_LEN;

const ADDRESSES_OFFSET_AT: usize = EPHEMERAL_KEY_LEN;
const VIEW_KEYS_OFFSET_AT: usize = ADDRESSES_OFFSET_AT + WORD_LEN;
const APP_DATA_OFFSET_AT: usize = VIEW_KEYS_OFFSET_AT + WORD_LEN;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MetadataError {
    /// Buffer shorter than the header.
    TooShort,
    /// An offset is out of order, out of range or not where the layout puts it.
    BadOffset,
    /// The approved-address count disagrees with the section length.
    BadAddressCount,
    /// An address word has non-zero high bytes.
    BadAddress,
}

fn read_word(buf: &[u8], at: usize) -> Result<usize, MetadataError> {
    let word = buf.get(at..at + WORD_LEN).ok_or(MetadataError::TooShort)?;
    let (high, low) = word.split_at(WORD_LEN - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(MetadataError::BadOffset);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(bytes)).map_err(|_| MetadataError::BadOffset)
}

fn word(value: usize) -> [u8; WORD_LEN] {
    let mut out = [0u8; WORD_LEN];
    out[WORD_LEN - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    out
}

fn address_word(address: &Address) -> [u8; WORD_LEN] {
    let mut out = [0u8; WORD_LEN];
    out[WORD_LEN - 20..].copy_from_slice(address);
    out
}

/// Byte ranges of the three sections.
struct Sections {
    addresses: (usize, usize),
    view_keys: (usize, usize),
    app_data: (usize, usize),
}

fn sections(buf: &[u8]) -> Result<Sections, MetadataError> {
    if buf.len() < METADATA_HEADER_LEN {
        return Err(MetadataError::TooShort);
    }
    let addresses = read_word(buf, ADDRESSES_OFFSET_AT)?;
    let view_keys = read_word(buf, VIEW_KEYS_OFFSET_AT)?;
    let app_data = read_word(buf, APP_DATA_OFFSET_AT)?;

    if addresses != METADATA_HEADER_LEN || view_keys < addresses || app_data < view_keys {
        return Err(MetadataError::BadOffset);
    }
    if app_data > buf.len() {
        return Err(MetadataError::BadOffset);
    }
    Ok(Sections {
        addresses: (addresses, view_keys),
        view_keys: (view_keys, app_data),
        app_data: (app_data, buf.len()),
    })
}

fn decode_addresses(section: &[u8]) -> Result<Vec<Address>, MetadataError> {
    let count = read_word(section, 0).map_err(|_| MetadataError::BadAddressCount)?;
    let body = &section[WORD_LEN..];
    if count.checked_mul(WORD_LEN) != Some(body.len()) {
        return Err(MetadataError::BadAddressCount);
    }
    body.chunks_exact(WORD_LEN)
        .map(|w| {
            let (high, low) = w.split_at(WORD_LEN - 20);
            if high.iter().any(|b| *b != 0) {
                return Err(MetadataError::BadAddress);
            }
            let mut address = [0u8; 20];
            address.copy_from_slice(low);
            Ok(address)
        })
        .collect()
}

/// Addresses the metadata grants update access to.
///
/// Metadata that carries nothing past the header grants nothing.
pub fn approved_addresses(buf: &[u8]) -> Result<Vec<Address>, MetadataError> {
    if buf.len() <= METADATA_HEADER_LEN {
        return Ok(Vec::new());
    }
    let s = sections(buf)?;
    decode_addresses(&buf[s.addresses.0..s.addresses.1])
}

/// Structured view of a metadata buffer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NoteMetadata {
    pub ephemeral_key: [u8; EPHEMERAL_KEY_LEN],
    pub approved_addresses: Vec<Address>,
    pub encrypted_view_keys: Vec<u8>,
    pub app_data: Vec<u8>,
}

impl NoteMetadata {
    pub fn encode(&self) -> Vec<u8> {
        let addresses_len = WORD_LEN * (1 + self.approved_addresses.len());
        let addresses_at = METADATA_HEADER_LEN;
        let view_keys_at = addresses_at + addresses_len;
        let app_data_at = view_keys_at + self.encrypted_view_keys.len();

        let mut out = Vec::with_capacity(app_data_at + self.app_data.len());
        out.extend_from_slice(&self.ephemeral_key);
        out.extend_from_slice(&word(addresses_at));
        out.extend_from_slice(&word(view_keys_at));
        out.extend_from_slice(&word(app_data_at));
        out.extend_from_slice(&word(self.approved_addresses.len()));
        for address in &self.approved_addresses {
            out.extend_from_slice(&address_word(address));
        }
        out.extend_from_slice(&self.encrypted_view_keys);
        out.extend_from_slice(&self.app_data);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, MetadataError> {
        let s = sections(buf)?;
        let mut ephemeral_key = [0u8; EPHEMERAL_KEY_LEN];
        ephemeral_key.copy_from_slice(&buf[..EPHEMERAL_KEY_LEN]);
        Ok(Self {
            ephemeral_key,
            approved_addresses: decode_addresses(&buf[s.addresses.0..s.addresses.1])?,
            encrypted_view_keys: buf[s.view_keys.0..s.view_keys.1].to_vec(),
            app_data: buf[s.app_data.0..s.app_data.1].to_vec(),
        })
    }
}
