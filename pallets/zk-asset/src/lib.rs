//! **pallet-zk-asset**
//!
//! Transfer engine for confidential note assets. Notes themselves live in the
//! registry behind `T::Registry`; this pallet decides whether a proposed
//! transition may be applied and keeps the side ledgers around it:
//! - `transfer` validates a balanced proof through `T::Validator`, checks an
//!   owner signature for every input note and applies each proof output,
//! - `transfer_from` applies an output the caller validated earlier, spending
//!   notes the owners approved the caller for (`approve`),
//! - `update_metadata` rewrites a note's metadata, gated by ownership or by an
//!   access grant that has not been superseded by a later update.
//!
//! Every signature that authorizes something is fingerprinted into
//! `SignatureLog` and can never authorize anything again. Each call runs in
//! its own storage layer: a failure anywhere leaves no trace of the call.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use core::cmp::Ordering;
use frame_support::{
    pallet_prelude::*,
    storage::with_storage_layer,
    traits::{Get, Time},
    PalletId,
};
use frame_system::pallet_prelude::*;
use sp_io::hashing::keccak_256;
use sp_runtime::traits::AccountIdConversion;

use zk_asset_primitives::{
    metadata::approved_addresses,
    split_proof_outputs,
    typed_data::{
        self, extract_challenge, join_split_hash_struct, note_approval_hash_struct,
        packed_signature, recover_signer, signature_fingerprint, typed_data_digest,
        EcdsaSignature,
    },
    Address, AddressMapping, MetadataBytes, NoteHash, NoteRegistry, PackedSignatures, ProofId,
    ProofOutput, ProofPayload, ProofValidator, SignatureBytes,
};

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;
#[cfg(test)]
mod mock;

pub use pallet::*;

pub const LOG_TARGET: &str = "runtime::zk-asset";

pub type MomentOf<T> = <<T as Config>::Time as Time>::Moment;

#[frame_support::pallet]
pub mod pallet {
    use super::*;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        type AssetId: Parameter + Member + Copy + MaxEncodedLen;

        /// Validates proofs and records their outputs for later application.
        type Validator: ProofValidator<Self::AccountId>;

        /// Holds note existence, ownership and status.
        type Registry: NoteRegistry<Self::AccountId, Self::AssetId>;

        type AddressMapping: AddressMapping<Self::AccountId>;

        /// Source of "now" for metadata stamps and access grants.
        type Time: Time;

        /// Derives the account that validates and applies `transfer` proofs.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// Typed-data domain name and version owners sign under.
        type DomainName: Get<&'static str>;
        type DomainVersion: Get<&'static str>;

        type WeightInfo: WeightInfo;
    }

    pub trait WeightInfo {
        fn transfer() -> Weight;
        fn transfer_from() -> Weight;
        fn approve() -> Weight;
        fn update_metadata() -> Weight;
    }

    impl WeightInfo for () {
        fn transfer() -> Weight {
            Weight::from_parts(500_000, 0)
        }
        fn transfer_from() -> Weight {
            Weight::from_parts(200_000, 0)
        }
        fn approve() -> Weight {
            Weight::from_parts(60_000, 0)
        }
        fn update_metadata() -> Weight {
            Weight::from_parts(40_000, 0)
        }
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    /// (asset, note, spender) → spender may consume the note through `transfer_from`.
    #[pallet::storage]
    pub type ConfidentialApprovals<T: Config> = StorageNMap<
        _,
        (
            NMapKey<Blake2_128Concat, T::AssetId>,
            NMapKey<Identity, NoteHash>,
            NMapKey<Blake2_128Concat, Address>,
        ),
        bool,
        ValueQuery,
    >;

    /// Fingerprints of every signature that has authorized something.
    #[pallet::storage]
    pub type SignatureLog<T: Config> = StorageMap<_, Identity, [u8; 32], bool, ValueQuery>;

    /// Moment of the last metadata write per note.
    #[pallet::storage]
    pub type MetadataTimeLog<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        T::AssetId,
        Identity,
        NoteHash,
        MomentOf<T>,
        OptionQuery,
    >;

    /// Moment an address was granted metadata access to a note.
    #[pallet::storage]
    pub type NoteAccess<T: Config> = StorageNMap<
        _,
        (
            NMapKey<Blake2_128Concat, T::AssetId>,
            NMapKey<Identity, NoteHash>,
            NMapKey<Blake2_128Concat, Address>,
        ),
        MomentOf<T>,
        OptionQuery,
    >;

    // --------------------------- Events / Errors --------------------------------------

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        NoteCreated {
            asset: T::AssetId,
            owner: Address,
            note_hash: NoteHash,
            metadata: Vec<u8>,
        },
        NoteDestroyed {
            asset: T::AssetId,
            owner: Address,
            note_hash: NoteHash,
        },
        NoteMetadataUpdated {
            asset: T::AssetId,
            note_hash: NoteHash,
            updater: Address,
            metadata: Vec<u8>,
        },
        /// Public value entered the confidential pool.
        TokensConverted {
            asset: T::AssetId,
            owner: Address,
            value: u128,
        },
        /// Public value left the confidential pool.
        TokensRedeemed {
            asset: T::AssetId,
            owner: Address,
            value: u128,
        },
        ApprovalSet {
            asset: T::AssetId,
            note_hash: NoteHash,
            spender: Address,
            approved: bool,
        },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// The proof validator rejected the payload.
        ProofInvalid,
        /// `transfer` only takes balanced proofs.
        WrongProofCategory,
        /// Signer (or submitter) is not the note owner.
        UnauthorizedSigner,
        /// Caller has no approval for one of the input notes.
        SpendNotApproved,
        SignatureReplayed,
        /// Note is spent or unknown.
        NoteNotUnspent,
        MetadataAccessDenied,
        RegistryUpdateFailed,
        /// Payload too short to carry a challenge.
        MalformedProof,
        MalformedProofOutput,
        /// Signature of the wrong size or encoding, or missing for an input.
        MalformedSignature,
        MalformedMetadata,
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Validate a balanced proof and apply every output it carries.
        ///
        /// `signatures` holds one packed `v || r || s` entry per input note, in
        /// order across all outputs, or is empty when the submitter owns every
        /// input.
        #[pallet::call_index(0)]
        #[pallet::weight(T::WeightInfo::transfer())]
        pub fn transfer(
            origin: OriginFor<T>,
            asset: T::AssetId,
            proof_id: u32,
            proof: ProofPayload,
            signatures: PackedSignatures,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let proof_id = ProofId(proof_id);
            ensure!(proof_id.is_balanced(), Error::<T>::WrongProofCategory);
            let sender = T::AddressMapping::to_address(&who);

            with_storage_layer(|| {
                let engine = Self::engine_account();
                let outputs = T::Validator::validate(proof_id, &engine, &sender, &proof)
                    .map_err(|e| {
                        log::debug!(target: LOG_TARGET, "proof {:?} rejected: {:?}", proof_id, e);
                        Error::<T>::ProofInvalid
                    })?;
                let challenge = extract_challenge(&proof).ok_or(Error::<T>::MalformedProof)?;
                let slices =
                    split_proof_outputs(&outputs).map_err(|_| Error::<T>::MalformedProofOutput)?;

                let mut next_signature = 0usize;
                for raw in slices {
                    let output = ProofOutput::decode(raw)
                        .map_err(|_| Error::<T>::MalformedProofOutput)?;

                    for note in &output.input_notes {
                        let signature = Self::input_signature(&signatures, next_signature)?;
                        next_signature += 1;
                        if let Some(signature) = &signature {
                            Self::consume_signature(signature)?;
                        }
                        let message =
                            join_split_hash_struct(proof_id, &note.note_hash, &challenge, &sender);
                        Self::validate_owner_signature(
                            asset,
                            &message,
                            &note.note_hash,
                            signature.as_ref(),
                            &sender,
                        )?;
                    }

                    Self::apply_proof_output(asset, proof_id, raw, &output, &who, &engine)?;
                }
                Ok(())
            })
        }

        /// Apply one proof output the caller validated beforehand, spending
        /// notes whose owners approved the caller.
        #[pallet::call_index(1)]
        #[pallet::weight(T::WeightInfo::transfer_from())]
        pub fn transfer_from(
            origin: OriginFor<T>,
            asset: T::AssetId,
            proof_id: u32,
            proof_output: ProofPayload,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let caller = T::AddressMapping::to_address(&who);

            with_storage_layer(|| {
                let output = ProofOutput::decode(&proof_output)
                    .map_err(|_| Error::<T>::MalformedProofOutput)?;
                for note in &output.input_notes {
                    ensure!(
                        ConfidentialApprovals::<T>::get((asset, note.note_hash, caller)),
                        Error::<T>::SpendNotApproved
                    );
                }
                Self::apply_proof_output(
                    asset,
                    ProofId(proof_id),
                    &proof_output,
                    &output,
                    &who,
                    &who,
                )
            })
        }

        /// Grant or revoke `spender`'s right to spend `note_hash`.
        ///
        /// `signature` is the owner's 65-byte `r || s || v` signature over the
        /// note approval message; empty when the owner submits it.
        #[pallet::call_index(2)]
        #[pallet::weight(T::WeightInfo::approve())]
        pub fn approve(
            origin: OriginFor<T>,
            asset: T::AssetId,
            note_hash: NoteHash,
            spender: Address,
            approved: bool,
            signature: SignatureBytes,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let submitter = T::AddressMapping::to_address(&who);

            with_storage_layer(|| {
                ensure!(
                    T::Registry::get_note(asset, &note_hash).is_some_and(|n| n.is_unspent()),
                    Error::<T>::NoteNotUnspent
                );

                let signature = if signature.is_empty() {
                    None
                } else {
                    let parsed = EcdsaSignature::from_rsv(&signature)
                        .ok_or(Error::<T>::MalformedSignature)?;
                    Self::consume_signature(&parsed)?;
                    Some(parsed)
                };
                let message = note_approval_hash_struct(&note_hash, &spender, approved);
                Self::validate_owner_signature(
                    asset,
                    &message,
                    &note_hash,
                    signature.as_ref(),
                    &submitter,
                )?;

                if approved {
                    ConfidentialApprovals::<T>::insert((asset, note_hash, spender), true);
                } else {
                    ConfidentialApprovals::<T>::remove((asset, note_hash, spender));
                }
                Self::deposit_event(Event::ApprovalSet { asset, note_hash, spender, approved });
                Ok(())
            })
        }

        /// Replace a note's metadata and grant access to the addresses it lists.
        #[pallet::call_index(3)]
        #[pallet::weight(T::WeightInfo::update_metadata())]
        pub fn update_metadata(
            origin: OriginFor<T>,
            asset: T::AssetId,
            note_hash: NoteHash,
            metadata: MetadataBytes,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let caller = T::AddressMapping::to_address(&who);

            with_storage_layer(|| {
                let note = T::Registry::get_note(asset, &note_hash)
                    .filter(|n| n.is_unspent())
                    .ok_or(Error::<T>::NoteNotUnspent)?;

                if caller != note.owner {
                    let granted = NoteAccess::<T>::get((asset, note_hash, caller))
                        .ok_or(Error::<T>::MetadataAccessDenied)?;
                    let last_update =
                        MetadataTimeLog::<T>::get(asset, note_hash).unwrap_or_default();
                    ensure!(granted >= last_update, Error::<T>::MetadataAccessDenied);
                }

                let now = T::Time::now();
                Self::approve_addresses(asset, &note_hash, &metadata, now)?;
                MetadataTimeLog::<T>::insert(asset, note_hash, now);

                Self::deposit_event(Event::NoteMetadataUpdated {
                    asset,
                    note_hash,
                    updater: caller,
                    metadata: metadata.into_inner(),
                });
                Ok(())
            })
        }
    }

    impl<T: Config> Pallet<T> {
        /// Account that validates and applies `transfer` proofs.
        pub fn engine_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        /// Typed-data domain of `asset`; the salt binds signatures to it.
        pub fn domain_separator(asset: T::AssetId) -> [u8; 32] {
            typed_data::domain_separator(
                T::DomainName::get().as_bytes(),
                T::DomainVersion::get().as_bytes(),
                &asset.using_encoded(keccak_256),
            )
        }

        /// Check that the owner of `note_hash` signed `message`.
        ///
        /// Without a signature the submitter stands in as the signer. Reads only.
        pub fn validate_owner_signature(
            asset: T::AssetId,
            message: &[u8; 32],
            note_hash: &NoteHash,
            signature: Option<&EcdsaSignature>,
            submitter: &Address,
        ) -> DispatchResult {
            let note = T::Registry::get_note(asset, note_hash).ok_or(Error::<T>::NoteNotUnspent)?;
            let signer = match signature {
                None => *submitter,
                Some(signature) => {
                    let digest = typed_data_digest(&Self::domain_separator(asset), message);
                    recover_signer(&digest, signature).ok_or(Error::<T>::UnauthorizedSigner)?
                }
            };
            ensure!(signer == note.owner, Error::<T>::UnauthorizedSigner);
            Ok(())
        }

        /// Record the signature's fingerprint, failing if it was seen before.
        pub fn consume_signature(signature: &EcdsaSignature) -> DispatchResult {
            let fingerprint = signature_fingerprint(&signature.normalized().to_rsv());
            SignatureLog::<T>::try_mutate(fingerprint, |used| -> DispatchResult {
                ensure!(!*used, Error::<T>::SignatureReplayed);
                *used = true;
                Ok(())
            })
        }

        fn input_signature(
            signatures: &[u8],
            index: usize,
        ) -> Result<Option<EcdsaSignature>, DispatchError> {
            if signatures.is_empty() {
                return Ok(None);
            }
            packed_signature(signatures, index)
                .and_then(EcdsaSignature::from_vrs_words)
                .map(Some)
                .ok_or_else(|| Error::<T>::MalformedSignature.into())
        }

        /// Grant metadata access to every address `metadata` lists.
        fn approve_addresses(
            asset: T::AssetId,
            note_hash: &NoteHash,
            metadata: &[u8],
            now: MomentOf<T>,
        ) -> DispatchResult {
            let addresses = approved_addresses(metadata).map_err(|e| {
                log::debug!(target: LOG_TARGET, "bad metadata for {:?}: {:?}", note_hash, e);
                Error::<T>::MalformedMetadata
            })?;
            for address in addresses {
                log::trace!(target: LOG_TARGET, "grant {:?} on note {:?}", address, note_hash);
                NoteAccess::<T>::insert((asset, *note_hash, address), now);
            }
            Ok(())
        }

        /// Apply one authorized proof output through the registry, then stamp
        /// the new notes and emit the lifecycle and value events.
        fn apply_proof_output(
            asset: T::AssetId,
            proof_id: ProofId,
            raw: &[u8],
            output: &ProofOutput,
            who: &T::AccountId,
            actor: &T::AccountId,
        ) -> DispatchResult {
            T::Registry::apply_transition(asset, proof_id, raw, actor).map_err(|e| {
                log::debug!(target: LOG_TARGET, "registry refused output from {:?}: {:?}", who, e);
                Error::<T>::RegistryUpdateFailed
            })?;

            let now = T::Time::now();
            for note in &output.output_notes {
                MetadataTimeLog::<T>::insert(asset, note.note_hash, now);
                Self::approve_addresses(asset, &note.note_hash, &note.metadata, now)?;
                Self::deposit_event(Event::NoteCreated {
                    asset,
                    owner: note.owner,
                    note_hash: note.note_hash,
                    metadata: note.metadata.clone(),
                });
            }
            for note in &output.input_notes {
                Self::deposit_event(Event::NoteDestroyed {
                    asset,
                    owner: note.owner,
                    note_hash: note.note_hash,
                });
            }

            let owner = output.public_owner;
            let value = output.public_value.unsigned_abs();
            match output.public_value.cmp(&0) {
                Ordering::Less => {
                    Self::deposit_event(Event::TokensConverted { asset, owner, value })
                },
                Ordering::Greater => {
                    Self::deposit_event(Event::TokensRedeemed { asset, owner, value })
                },
                Ordering::Equal => {},
            }

            log::debug!(
                target: LOG_TARGET,
                "applied {:?}: {} in, {} out, public {}",
                proof_id,
                output.input_notes.len(),
                output.output_notes.len(),
                output.public_value,
            );
            Ok(())
        }
    }
}
