//! **pallet-note-registry**
//!
//! Holds the notes of every confidential asset and the record of which proof
//! outputs have been validated, by whom.
//!
//! Proof mathematics is delegated to `T::Verifier`. A balanced proof is
//! validated once (`ProofValidator::validate`), which records each of its
//! outputs under the validating account; the same account may later apply
//! each output exactly once (`NoteRegistry::apply_transition`). Applying an
//! output spends its input notes, creates its output notes and settles its
//! public value against the asset's public token through `T::Ramp`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use frame_support::{pallet_prelude::*, storage::with_storage_layer, PalletId};
use frame_system::pallet_prelude::*;
use sp_io::hashing::keccak_256;
use sp_runtime::traits::{AccountIdConversion, AtLeast32BitUnsigned, CheckedMul, CheckedSub, Zero};

use zk_asset_primitives::{
    split_proof_outputs, Address, AddressMapping, NoteCommitment, NoteEntry, NoteHash, NoteInfo,
    NoteRegistry, NoteStatus, ProofId, ProofOutput, ProofPayload, ProofValidator, ProofVerifier,
    Ramp,
};

#[cfg(test)]
mod mock;

pub use pallet::*;

pub const LOG_TARGET: &str = "runtime::note-registry";

/// Per-asset registry settings.
#[derive(Clone, Encode, Decode, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct RegistryInfo<Balance> {
    /// Public tokens per unit of confidential value.
    pub scaling_factor: Balance,
    /// Whether proofs may move value across the public/confidential boundary.
    pub can_convert: bool,
}

#[derive(Clone, Encode, Decode, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct NoteRecord<BlockNumber> {
    pub status: NoteStatus,
    pub owner: Address,
    pub commitment: NoteCommitment,
    pub created_at: BlockNumber,
    pub destroyed_at: Option<BlockNumber>,
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        type AssetId: Parameter + Member + Copy + MaxEncodedLen;
        type Balance: Parameter + Member + AtLeast32BitUnsigned + Copy + Default + MaxEncodedLen;

        /// Proof mathematics (runtime supplied).
        type Verifier: ProofVerifier;

        /// Public token movements for non-zero public values.
        type Ramp: Ramp<Self::AccountId, Self::AssetId, Self::Balance>;

        type AddressMapping: AddressMapping<Self::AccountId>;

        /// Origin allowed to create registries.
        type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;

        /// PalletId used to derive the account holding converted public tokens.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        type WeightInfo: WeightInfo;
    }

    pub trait WeightInfo {
        fn create_registry() -> Weight;
        fn validate_proof() -> Weight;
        fn approve_public() -> Weight;
    }

    impl WeightInfo for () {
        fn create_registry() -> Weight {
            Weight::from_parts(10_000, 0)
        }
        fn validate_proof() -> Weight {
            Weight::from_parts(200_000, 0)
        }
        fn approve_public() -> Weight {
            Weight::from_parts(10_000, 0)
        }
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    #[pallet::storage]
    pub type Registries<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AssetId, RegistryInfo<T::Balance>, OptionQuery>;

    #[pallet::storage]
    pub type Notes<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        T::AssetId,
        Identity,
        NoteHash,
        NoteRecord<BlockNumberFor<T>>,
        OptionQuery,
    >;

    /// keccak(SCALE(keccak(proof output), proof id, validator)) → validated and not yet applied.
    #[pallet::storage]
    pub type ValidatedProofs<T: Config> = StorageMap<_, Identity, [u8; 32], bool, ValueQuery>;

    /// (public owner, asset, proof-output hash) → public tokens the owner lets
    /// that output pull in.
    #[pallet::storage]
    pub type PublicApprovals<T: Config> = StorageNMap<
        _,
        (
            NMapKey<Blake2_128Concat, T::AccountId>,
            NMapKey<Blake2_128Concat, T::AssetId>,
            NMapKey<Identity, [u8; 32]>,
        ),
        T::Balance,
        ValueQuery,
    >;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        RegistryCreated {
            asset: T::AssetId,
            scaling_factor: T::Balance,
            can_convert: bool,
        },
        ProofValidated {
            proof_id: u32,
            validator: T::AccountId,
            outputs: u32,
        },
        PublicApprovalSet {
            owner: T::AccountId,
            asset: T::AssetId,
            proof_hash: [u8; 32],
            amount: T::Balance,
        },
        TransitionApplied {
            asset: T::AssetId,
            proof_hash: [u8; 32],
            destroyed: u32,
            created: u32,
            public_value: i128,
        },
    }

    #[pallet::error]
    pub enum Error<T> {
        RegistryExists,
        ZeroScalingFactor,
        UnknownRegistry,
        /// The verifier rejected the proof.
        ProofVerificationFailed,
        MalformedProofOutput,
        /// No matching validation by this actor, or it was already applied.
        ProofNotValidated,
        NoteNotFound,
        NoteAlreadySpent,
        NoteOwnerMismatch,
        NoteAlreadyExists,
        /// Output note hash is not keccak256 of its commitment.
        NoteHashMismatch,
        ConversionDisabled,
        InsufficientPublicApproval,
        PublicTransferFailed,
        ArithmeticOverflow,
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        #[pallet::call_index(0)]
        #[pallet::weight(T::WeightInfo::create_registry())]
        pub fn create_registry(
            origin: OriginFor<T>,
            asset: T::AssetId,
            scaling_factor: T::Balance,
            can_convert: bool,
        ) -> DispatchResult {
            T::AdminOrigin::ensure_origin(origin)?;
            ensure!(!Registries::<T>::contains_key(asset), Error::<T>::RegistryExists);
            ensure!(!scaling_factor.is_zero(), Error::<T>::ZeroScalingFactor);

            Registries::<T>::insert(asset, RegistryInfo { scaling_factor, can_convert });
            Self::deposit_event(Event::RegistryCreated { asset, scaling_factor, can_convert });
            Ok(())
        }

        /// Validate a proof on the caller's behalf so the caller can apply its
        /// outputs later (e.g. through `pallet_zk_asset::transfer_from`).
        #[pallet::call_index(1)]
        #[pallet::weight(T::WeightInfo::validate_proof())]
        pub fn validate_proof(
            origin: OriginFor<T>,
            proof_id: u32,
            proof: ProofPayload,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let sender = T::AddressMapping::to_address(&who);
            <Self as ProofValidator<T::AccountId>>::validate(
                ProofId(proof_id),
                &who,
                &sender,
                &proof,
            )?;
            Ok(())
        }

        /// Allow the proof output hashing to `proof_hash` to convert up to
        /// `amount` of the caller's public tokens into confidential value.
        #[pallet::call_index(2)]
        #[pallet::weight(T::WeightInfo::approve_public())]
        pub fn approve_public(
            origin: OriginFor<T>,
            asset: T::AssetId,
            proof_hash: [u8; 32],
            amount: T::Balance,
        ) -> DispatchResult {
            let owner = ensure_signed(origin)?;
            PublicApprovals::<T>::insert((owner.clone(), asset, proof_hash), amount);
            Self::deposit_event(Event::PublicApprovalSet { owner, asset, proof_hash, amount });
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Account holding public tokens that entered the confidential pool.
        pub fn pool_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        pub fn validation_key(
            proof_id: ProofId,
            proof_hash: &[u8; 32],
            validator: &T::AccountId,
        ) -> [u8; 32] {
            (proof_hash, proof_id, validator).using_encoded(keccak_256)
        }

        fn destroy_note(
            asset: T::AssetId,
            note: &NoteEntry,
            now: BlockNumberFor<T>,
        ) -> DispatchResult {
            Notes::<T>::try_mutate(asset, note.note_hash, |maybe| -> DispatchResult {
                let record = maybe.as_mut().ok_or(Error::<T>::NoteNotFound)?;
                ensure!(record.status == NoteStatus::Unspent, Error::<T>::NoteAlreadySpent);
                ensure!(record.owner == note.owner, Error::<T>::NoteOwnerMismatch);
                record.status = NoteStatus::Spent;
                record.destroyed_at = Some(now);
                Ok(())
            })
        }

        fn create_note(
            asset: T::AssetId,
            note: &NoteEntry,
            now: BlockNumberFor<T>,
        ) -> DispatchResult {
            ensure!(
                !Notes::<T>::contains_key(asset, note.note_hash),
                Error::<T>::NoteAlreadyExists
            );
            ensure!(keccak_256(&note.commitment) == note.note_hash, Error::<T>::NoteHashMismatch);
            Notes::<T>::insert(
                asset,
                note.note_hash,
                NoteRecord {
                    status: NoteStatus::Unspent,
                    owner: note.owner,
                    commitment: note.commitment,
                    created_at: now,
                    destroyed_at: None,
                },
            );
            Ok(())
        }

        fn settle_public_value(
            asset: T::AssetId,
            registry: &RegistryInfo<T::Balance>,
            output: &ProofOutput,
            proof_hash: [u8; 32],
        ) -> DispatchResult {
            ensure!(registry.can_convert, Error::<T>::ConversionDisabled);

            let amount = T::Balance::try_from(output.public_value.unsigned_abs())
                .ok()
                .and_then(|v| v.checked_mul(&registry.scaling_factor))
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            let owner = T::AddressMapping::into_account_id(&output.public_owner);
            let pool = Self::pool_account();

            let moved = if output.public_value < 0 {
                PublicApprovals::<T>::try_mutate(
                    (owner.clone(), asset, proof_hash),
                    |approved| -> DispatchResult {
                        *approved = approved
                            .checked_sub(&amount)
                            .ok_or(Error::<T>::InsufficientPublicApproval)?;
                        Ok(())
                    },
                )?;
                T::Ramp::transfer_from(&owner, &pool, asset, amount)
            } else {
                T::Ramp::transfer_from(&pool, &owner, asset, amount)
            };
            moved.map_err(|_| {
                log::debug!(
                    target: LOG_TARGET,
                    "public transfer of {:?} for value {} failed",
                    amount,
                    output.public_value,
                );
                Error::<T>::PublicTransferFailed.into()
            })
        }
    }

    impl<T: Config> ProofValidator<T::AccountId> for Pallet<T> {
        fn validate(
            proof_id: ProofId,
            validator: &T::AccountId,
            sender: &Address,
            payload: &[u8],
        ) -> Result<Vec<u8>, DispatchError> {
            let outputs = T::Verifier::verify(proof_id, sender, payload).map_err(|_| {
                log::debug!(target: LOG_TARGET, "verifier rejected proof {:?}", proof_id);
                Error::<T>::ProofVerificationFailed
            })?;

            // Only balanced proofs move notes; other categories are verify-only.
            if proof_id.is_balanced() {
                let slices =
                    split_proof_outputs(&outputs).map_err(|_| Error::<T>::MalformedProofOutput)?;
                for slice in &slices {
                    let key = Self::validation_key(proof_id, &keccak_256(slice), validator);
                    ValidatedProofs::<T>::insert(key, true);
                }
                Self::deposit_event(Event::ProofValidated {
                    proof_id: proof_id.0,
                    validator: validator.clone(),
                    outputs: slices.len() as u32,
                });
            }
            Ok(outputs)
        }
    }

    impl<T: Config> NoteRegistry<T::AccountId, T::AssetId> for Pallet<T> {
        fn get_note(asset: T::AssetId, note_hash: &NoteHash) -> Option<NoteInfo> {
            Notes::<T>::get(asset, note_hash).map(|record| NoteInfo {
                status: record.status,
                owner: record.owner,
                commitment: record.commitment,
            })
        }

        fn apply_transition(
            asset: T::AssetId,
            proof_id: ProofId,
            proof_output: &[u8],
            actor: &T::AccountId,
        ) -> DispatchResult {
            with_storage_layer(|| {
                let registry = Registries::<T>::get(asset).ok_or(Error::<T>::UnknownRegistry)?;

                let proof_hash = keccak_256(proof_output);
                // Single use: the record goes away with the first application.
                ensure!(
                    ValidatedProofs::<T>::take(Self::validation_key(proof_id, &proof_hash, actor)),
                    Error::<T>::ProofNotValidated
                );

                let output = ProofOutput::decode(proof_output)
                    .map_err(|_| Error::<T>::MalformedProofOutput)?;
                let now = frame_system::Pallet::<T>::block_number();

                for note in &output.input_notes {
                    Self::destroy_note(asset, note, now)?;
                }
                for note in &output.output_notes {
                    Self::create_note(asset, note, now)?;
                }
                if output.public_value != 0 {
                    Self::settle_public_value(asset, &registry, &output, proof_hash)?;
                }

                log::debug!(
                    target: LOG_TARGET,
                    "applied proof output {:?}: -{} +{} notes",
                    proof_hash,
                    output.input_notes.len(),
                    output.output_notes.len(),
                );
                Self::deposit_event(Event::TransitionApplied {
                    asset,
                    proof_hash,
                    destroyed: output.input_notes.len() as u32,
                    created: output.output_notes.len() as u32,
                    public_value: output.public_value,
                });
                Ok(())
            })
        }

        #[cfg(feature = "runtime-benchmarks")]
        fn register_note(asset: T::AssetId, note_hash: NoteHash, owner: Address) -> DispatchResult {
            if !Registries::<T>::contains_key(asset) {
                Registries::<T>::insert(
                    asset,
                    RegistryInfo { scaling_factor: 1u32.into(), can_convert: false },
                );
            }
            Notes::<T>::insert(
                asset,
                note_hash,
                NoteRecord {
                    status: NoteStatus::Unspent,
                    owner,
                    commitment: [0u8; 64],
                    created_at: frame_system::Pallet::<T>::block_number(),
                    destroyed_at: None,
                },
            );
            Ok(())
        }
    }
}
