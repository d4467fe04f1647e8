//! EIP-712 style messages signed by note owners, and signer recovery.

use sp_io::hashing::keccak_256;

use crate::{Address, NoteHash, ProofId};

pub const EIP712_DOMAIN_TYPE: &[u8] = b"EIP712Domain(string name,string version,bytes32 salt)";
pub const JOIN_SPLIT_SIGNATURE_TYPE: &[u8] =
    b"JoinSplitSignature(uint24 proof,bytes32 noteHash,uint256 challenge,address sender)";
pub const NOTE_SIGNATURE_TYPE: &[u8] =
    b"NoteSignature(bytes32 noteHash,address spender,bool spenderApproval)";

/// Length of one packed `v || r || s` entry (three 32-byte words).
pub const PACKED_SIGNATURE_LEN: usize = 96;
/// Length of a plain `r || s || v` signature.
pub const RSV_SIGNATURE_LEN: usize = 65;
/// Offset of the challenge word inside a proof payload.
pub const CHALLENGE_OFFSET: usize = 0x20;

fn u32_word(value: u32) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[28..].copy_from_slice(&value.to_be_bytes());
    w
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(address);
    w
}

fn bool_word(value: bool) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[31] = value as u8;
    w
}

fn hash_words(words: &[[u8; 32]]) -> [u8; 32] {
    let mut buf = sp_std::vec::Vec::with_capacity(words.len() * 32);
    for w in words {
        buf.extend_from_slice(w);
    }
    keccak_256(&buf)
}

pub fn domain_separator(name: &[u8], version: &[u8], salt: &[u8; 32]) -> [u8; 32] {
    hash_words(&[
        keccak_256(EIP712_DOMAIN_TYPE),
        keccak_256(name),
        keccak_256(version),
        *salt,
    ])
}

/// Message an owner signs to let `sender` spend `note_hash` in the proof with
/// the given challenge.
pub fn join_split_hash_struct(
    proof_id: ProofId,
    note_hash: &NoteHash,
    challenge: &[u8; 32],
    sender: &Address,
) -> [u8; 32] {
    hash_words(&[
        keccak_256(JOIN_SPLIT_SIGNATURE_TYPE),
        u32_word(proof_id.0 & 0x00ff_ffff),
        *note_hash,
        *challenge,
        address_word(sender),
    ])
}

/// Message an owner signs to grant or revoke `spender`'s right to spend a note.
pub fn note_approval_hash_struct(
    note_hash: &NoteHash,
    spender: &Address,
    approved: bool,
) -> [u8; 32] {
    hash_words(&[
        keccak_256(NOTE_SIGNATURE_TYPE),
        *note_hash,
        address_word(spender),
        bool_word(approved),
    ])
}

pub fn typed_data_digest(domain_separator: &[u8; 32], hash_struct: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 66];
    buf[0] = 0x19;
    buf[1] = 0x01;
    buf[2..34].copy_from_slice(domain_separator);
    buf[34..].copy_from_slice(hash_struct);
    keccak_256(&buf)
}

/// Replay-log key of a raw signature.
pub fn signature_fingerprint(signature: &[u8]) -> [u8; 32] {
    keccak_256(signature)
}

/// Freshness challenge carried by a proof payload.
pub fn extract_challenge(payload: &[u8]) -> Option<[u8; 32]> {
    let word = payload.get(CHALLENGE_OFFSET..CHALLENGE_OFFSET + 32)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(word);
    Some(out)
}

/// The `index`-th entry of a packed signature buffer.
pub fn packed_signature(buf: &[u8], index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(PACKED_SIGNATURE_LEN)?;
    buf.get(start..start.checked_add(PACKED_SIGNATURE_LEN)?)
}

/// Half the secp256k1 group order; `s` above it is the malleated twin of a
/// valid signature.
pub const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EcdsaSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl EcdsaSignature {
    /// `r || s || v`, 65 bytes.
    pub fn from_rsv(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RSV_SIGNATURE_LEN {
            return None;
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Some(Self { r, s, v: bytes[64] })
    }

    /// `v || r || s` as three 32-byte words, `v` in the low byte of its word.
    pub fn from_vrs_words(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PACKED_SIGNATURE_LEN || bytes[..31].iter().any(|b| *b != 0) {
            return None;
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[32..64]);
        s.copy_from_slice(&bytes[64..96]);
        Some(Self { r, s, v: bytes[31] })
    }

    /// Same signature with `v` as a bare recovery id (0 or 1).
    pub fn normalized(&self) -> Self {
        Self { v: if self.v >= 27 { self.v - 27 } else { self.v }, ..*self }
    }

    /// Canonical form: `s` in the lower half of the group order.
    pub fn is_low_s(&self) -> bool {
        self.s <= SECP256K1_HALF_ORDER
    }

    pub fn to_rsv(&self) -> [u8; RSV_SIGNATURE_LEN] {
        let mut out = [0u8; RSV_SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn to_vrs_words(&self) -> [u8; PACKED_SIGNATURE_LEN] {
        let mut out = [0u8; PACKED_SIGNATURE_LEN];
        out[31] = self.v;
        out[32..64].copy_from_slice(&self.r);
        out[64..].copy_from_slice(&self.s);
        out
    }
}

/// Address of the public key that produced `signature` over `digest`.
///
/// Only low-`s` signatures recover, so each signature has a single accepted
/// encoding.
pub fn recover_signer(digest: &[u8; 32], signature: &EcdsaSignature) -> Option<Address> {
    if !matches!(signature.v, 0 | 1 | 27 | 28) || !signature.is_low_s() {
        return None;
    }
    let public = sp_io::crypto::secp256k1_ecdsa_recover(&signature.to_rsv(), digest).ok()?;
    Some(address_of_public(&public))
}

/// Address of an uncompressed (x || y) secp256k1 public key.
pub fn address_of_public(public: &[u8; 64]) -> Address {
    let hash = keccak_256(public);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}
