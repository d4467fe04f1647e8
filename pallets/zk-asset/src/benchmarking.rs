//! Benchmarking for `pallet-zk-asset`.
//!
//! `transfer` and `transfer_from` are dominated by the validator and the
//! registry, which need real proofs; they are weighed with those backends.

use crate::*;
use frame_benchmarking::v2::*;
use frame_system::RawOrigin;
use zk_asset_primitives::NoteMetadata;

/// Grants carried by the benchmarked metadata (close to what fits in `MaxMetadataLen`).
const GRANTS: u8 = 100;

#[benchmarks(where T::AssetId: Default)]
mod benchmarks {
    use super::*;

    fn owned_note<T: Config>(owner: &T::AccountId) -> Result<NoteHash, BenchmarkError> {
        let note_hash = [7u8; 32];
        T::Registry::register_note(
            T::AssetId::default(),
            note_hash,
            T::AddressMapping::to_address(owner),
        )
        .map_err(|_| BenchmarkError::Stop("cannot register note"))?;
        Ok(note_hash)
    }

    #[benchmark]
    fn approve() -> Result<(), BenchmarkError> {
        let caller: T::AccountId = whitelisted_caller();
        let asset = T::AssetId::default();
        let note_hash = owned_note::<T>(&caller)?;
        let spender = [1u8; 20];

        #[extrinsic_call]
        approve(RawOrigin::Signed(caller), asset, note_hash, spender, true, Default::default());

        assert!(ConfidentialApprovals::<T>::get((asset, note_hash, spender)));
        Ok(())
    }

    #[benchmark]
    fn update_metadata() -> Result<(), BenchmarkError> {
        let caller: T::AccountId = whitelisted_caller();
        let asset = T::AssetId::default();
        let note_hash = owned_note::<T>(&caller)?;
        let metadata: MetadataBytes = NoteMetadata {
            ephemeral_key: [2; 33],
            approved_addresses: (0..GRANTS).map(|i| [i; 20]).collect(),
            encrypted_view_keys: Vec::new(),
            app_data: Vec::new(),
        }
        .encode()
        .try_into()
        .map_err(|_| BenchmarkError::Stop("metadata too long"))?;

        #[extrinsic_call]
        update_metadata(RawOrigin::Signed(caller), asset, note_hash, metadata);

        assert!(MetadataTimeLog::<T>::contains_key(asset, note_hash));
        assert!(NoteAccess::<T>::contains_key((asset, note_hash, [GRANTS - 1; 20])));
        Ok(())
    }

    impl_benchmark_test_suite!(Pallet, crate::mock::new_test_ext(), crate::mock::Runtime);
}
