//! Types and traits for confidential note assets.
//!
//! A note is an owned, value-hiding record identified by the keccak hash of its
//! commitment. Notes are created and destroyed by proofs whose mathematics live
//! behind [`ProofVerifier`]; this crate only fixes the byte layouts exchanged
//! with the verifier and the typed-data messages note owners sign.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use frame_support::{pallet_prelude::*, BoundedVec};
use sp_std::prelude::*;

pub mod metadata;
pub mod proof_output;
pub mod typed_data;

pub use metadata::{MetadataError, NoteMetadata};
pub use proof_output::{split_proof_outputs, CodecError, NoteEntry, ProofOutput};

/// Ethereum-style public address of a note owner (last 20 bytes of keccak(pubkey)).
pub type Address = [u8; 20];
/// Content hash of a note: keccak256 of its commitment.
pub type NoteHash = [u8; 32];
/// Opaque value commitment (gamma || sigma). Never decoded on chain.
pub type NoteCommitment = [u8; 64];

/// Proof payload submitted for validation.
pub type MaxProofLen = ConstU32<8192>;
pub type ProofPayload = BoundedVec<u8, MaxProofLen>;

/// Encrypted note metadata.
pub type MaxMetadataLen = ConstU32<4096>;
pub type MetadataBytes = BoundedVec<u8, MaxMetadataLen>;

/// Packed `v || r || s` words, one per input note.
pub type MaxSignaturesLen = ConstU32<3072>;
pub type PackedSignatures = BoundedVec<u8, MaxSignaturesLen>;

/// A single `r || s || v` signature (or empty for self-authorization).
pub type MaxSignatureLen = ConstU32<65>;
pub type SignatureBytes = BoundedVec<u8, MaxSignatureLen>;

/// Proof categories encoded in the middle byte of a [`ProofId`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Encode, Decode, TypeInfo, MaxEncodedLen)]
pub enum ProofCategory {
    Balanced = 1,
    Mint = 2,
    Burn = 3,
    Utility = 4,
}

/// Proof identifier: `epoch << 16 | category << 8 | id`.
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Default, Encode, Decode, TypeInfo, MaxEncodedLen,
)]
pub struct ProofId(pub u32);

impl ProofId {
    pub const fn new(epoch: u8, category: u8, id: u8) -> Self {
        Self(((epoch as u32) << 16) | ((category as u32) << 8) | id as u32)
    }

    pub fn epoch(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn category(&self) -> Option<ProofCategory> {
        match (self.0 >> 8) as u8 {
            1 => Some(ProofCategory::Balanced),
            2 => Some(ProofCategory::Mint),
            3 => Some(ProofCategory::Burn),
            4 => Some(ProofCategory::Utility),
            _ => None,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.category() == Some(ProofCategory::Balanced)
    }
}

/// The join-split proof: the only proof `transfer` accepts today.
pub const JOIN_SPLIT: ProofId = ProofId::new(1, 1, 1);

#[derive(Clone, Copy, PartialEq, Eq, Debug, Encode, Decode, TypeInfo, MaxEncodedLen)]
pub enum NoteStatus {
    Unspent,
    Spent,
}

/// What the registry exposes about a note.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode, TypeInfo, MaxEncodedLen)]
pub struct NoteInfo {
    pub status: NoteStatus,
    pub owner: Address,
    pub commitment: NoteCommitment,
}

impl NoteInfo {
    pub fn is_unspent(&self) -> bool {
        self.status == NoteStatus::Unspent
    }
}

/// Converts between runtime accounts and the addresses notes are owned by.
pub trait AddressMapping<AccountId> {
    fn to_address(who: &AccountId) -> Address;
    fn into_account_id(address: &Address) -> AccountId;
}

/// Abstract verifier boundary. Implement in the runtime.
pub trait ProofVerifier {
    /// Check `payload` as a proof of kind `proof_id` bound to `sender` and
    /// return its encoded proof outputs (see [`proof_output`]).
    fn verify(proof_id: ProofId, sender: &Address, payload: &[u8]) -> Result<Vec<u8>, ()>;
}

/// Validates proofs and remembers, per validator, which outputs may be applied.
pub trait ProofValidator<AccountId> {
    fn validate(
        proof_id: ProofId,
        validator: &AccountId,
        sender: &Address,
        payload: &[u8],
    ) -> Result<Vec<u8>, DispatchError>;
}

/// Backend that holds the **truth** for note existence, ownership and status.
pub trait NoteRegistry<AccountId, AssetId> {
    fn get_note(asset: AssetId, note_hash: &NoteHash) -> Option<NoteInfo>;

    /// Atomically destroy the inputs, create the outputs and settle the public
    /// value of one previously validated proof output.
    fn apply_transition(
        asset: AssetId,
        proof_id: ProofId,
        proof_output: &[u8],
        actor: &AccountId,
    ) -> DispatchResult;

    /// Insert an unspent note directly. Benchmark setup only.
    #[cfg(feature = "runtime-benchmarks")]
    fn register_note(asset: AssetId, note_hash: NoteHash, owner: Address) -> DispatchResult;
}

/// Public side of an asset.
/// `transfer_from` moves `amount` of `asset` from `from` to `to`; the registry
/// uses it to move tokens into and out of its pool account.
pub trait Ramp<AccountId, AssetId, Amount> {
    type Error;

    fn transfer_from(
        from: &AccountId,
        to: &AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<(), Self::Error>;
}
