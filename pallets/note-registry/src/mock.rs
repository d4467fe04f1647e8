use crate::pallet as pallet_note_registry;
use frame_support::{
    construct_runtime, derive_impl, parameter_types, storage::unhashed, PalletId,
};
use frame_system::EnsureRoot;
use parity_scale_codec::Encode;
use sp_io::hashing::keccak_256;
use sp_runtime::BuildStorage;
use zk_asset_primitives::{
    proof_output::encode_proof_outputs, Address, AddressMapping, NoteEntry, ProofId, ProofOutput,
    ProofVerifier, Ramp,
};

pub type AccountId = u64;
pub type AssetId = u32;
pub type Balance = u64;
pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const ASSET: AssetId = 7;

/// First payload byte that makes [`EchoVerifier`] reject.
pub const REJECT: u8 = 0xEE;

// --- Echo verifier ----------------------------------------------------------
// Payload = marker word || challenge word || encoded proof outputs.
// The outputs are handed back untouched, so tests choose the transition.

pub struct EchoVerifier;

impl ProofVerifier for EchoVerifier {
    fn verify(_proof_id: ProofId, _sender: &Address, payload: &[u8]) -> Result<Vec<u8>, ()> {
        match payload.first() {
            Some(&REJECT) | None => Err(()),
            _ => payload.get(64..).map(|rest| rest.to_vec()).ok_or(()),
        }
    }
}

// --- Public token ledger kept in raw storage so it rolls back with the call --

pub struct MockRamp;

fn balance_key(asset: AssetId, who: &AccountId) -> Vec<u8> {
    (b"mock-ramp", asset, who).encode()
}

impl MockRamp {
    pub fn balance(asset: AssetId, who: &AccountId) -> Balance {
        unhashed::get_or_default(&balance_key(asset, who))
    }

    pub fn set_balance(asset: AssetId, who: &AccountId, amount: Balance) {
        unhashed::put(&balance_key(asset, who), &amount);
    }
}

impl Ramp<AccountId, AssetId, Balance> for MockRamp {
    type Error = ();

    fn transfer_from(
        from: &AccountId,
        to: &AccountId,
        asset: AssetId,
        amount: Balance,
    ) -> Result<(), ()> {
        let from_balance = Self::balance(asset, from).checked_sub(amount).ok_or(())?;
        Self::set_balance(asset, from, from_balance);
        Self::set_balance(asset, to, Self::balance(asset, to) + amount);
        Ok(())
    }
}

/// Account `n` owns the address whose low eight bytes are `n` big-endian.
pub struct LowBytesMapping;

impl AddressMapping<AccountId> for LowBytesMapping {
    fn to_address(who: &AccountId) -> Address {
        let mut out = [0u8; 20];
        out[12..].copy_from_slice(&who.to_be_bytes());
        out
    }

    fn into_account_id(address: &Address) -> AccountId {
        let mut low = [0u8; 8];
        low.copy_from_slice(&address[12..]);
        AccountId::from_be_bytes(low)
    }
}

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Runtime {
    type Block = frame_system::mocking::MockBlock<Runtime>;
}

parameter_types! {
    pub const RegistryPalletId: PalletId = PalletId(*b"NoteRgst");
}

impl pallet_note_registry::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type AssetId = AssetId;
    type Balance = Balance;
    type Verifier = EchoVerifier;
    type Ramp = MockRamp;
    type AddressMapping = LowBytesMapping;
    type AdminOrigin = EnsureRoot<AccountId>;
    type PalletId = RegistryPalletId;
    type WeightInfo = ();
}

construct_runtime!(
    pub enum Runtime {
        System: frame_system,
        Registry: pallet_note_registry,
    }
);

pub fn new_test_ext() -> sp_io::TestExternalities {
    let t = frame_system::GenesisConfig::<Runtime>::default()
        .build_storage()
        .unwrap();
    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| System::set_block_number(1));
    ext
}

pub fn address(who: AccountId) -> Address {
    LowBytesMapping::to_address(&who)
}

/// Note whose hash is consistent with its commitment.
pub fn note(owner: Address, seed: u8) -> NoteEntry {
    let commitment = [seed; 64];
    NoteEntry { owner, note_hash: keccak_256(&commitment), commitment, metadata: vec![seed] }
}

pub fn transition(inputs: Vec<NoteEntry>, outputs: Vec<NoteEntry>) -> ProofOutput {
    ProofOutput { input_notes: inputs, output_notes: outputs, ..Default::default() }
}

/// Payload understood by [`EchoVerifier`].
pub fn payload(challenge: [u8; 32], outputs: &[ProofOutput]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out.extend_from_slice(&challenge);
    out.extend_from_slice(&encode_proof_outputs(outputs).unwrap());
    out
}
