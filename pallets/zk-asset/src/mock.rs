use crate::pallet as pallet_zk_asset;
use frame_support::{
    assert_ok, construct_runtime, derive_impl, parameter_types, storage::unhashed,
    traits::ConstU64, PalletId,
};
use frame_system::EnsureRoot;
use parity_scale_codec::Encode;
use sp_core::{ecdsa, Pair};
use sp_io::hashing::keccak_256;
use sp_runtime::BuildStorage;
use zk_asset_primitives::{
    proof_output::encode_proof_outputs,
    typed_data::{
        join_split_hash_struct, note_approval_hash_struct, recover_signer, typed_data_digest,
        EcdsaSignature,
    },
    AddressMapping, Address, NoteEntry, NoteHash, NoteMetadata, ProofId, ProofOutput,
    ProofVerifier, Ramp, JOIN_SPLIT,
};

pub type AccountId = u64;
pub type AssetId = u32;
pub type Balance = u64;
pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const CHARLIE: AccountId = 3;
pub const ASSET: AssetId = 7;

/// First payload byte that makes [`EchoVerifier`] reject.
pub const REJECT: u8 = 0xEE;

// --- Echo verifier ----------------------------------------------------------
// Payload = marker word || challenge word || encoded proof outputs. A payload
// too short to hold both words verifies to an empty output list.

pub struct EchoVerifier;

impl ProofVerifier for EchoVerifier {
    fn verify(_proof_id: ProofId, _sender: &Address, payload: &[u8]) -> Result<Vec<u8>, ()> {
        match payload.first() {
            Some(&REJECT) | None => Err(()),
            _ => Ok(payload.get(64..).map(|rest| rest.to_vec()).unwrap_or_else(|| {
                0u32.to_be_bytes().to_vec()
            })),
        }
    }
}

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

impl pallet_timestamp::Config for Runtime {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ConstU64<1>;
    type WeightInfo = ();
}

parameter_types! {
    pub const RegistryPalletId: PalletId = PalletId(*b"NoteRgst");
    pub const EnginePalletId: PalletId = PalletId(*b"ZkAsset_");
    pub const DomainName: &'static str = "ZK_ASSET";
    pub const DomainVersion: &'static str = "1";
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

impl pallet_zk_asset::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type AssetId = AssetId;
    type Validator = Registry;
    type Registry = Registry;
    type AddressMapping = LowBytesMapping;
    type Time = Timestamp;
    type PalletId = EnginePalletId;
    type DomainName = DomainName;
    type DomainVersion = DomainVersion;
    type WeightInfo = ();
}

construct_runtime!(
    pub enum Runtime {
        System: frame_system,
        Timestamp: pallet_timestamp,
        Registry: pallet_note_registry,
        ZkAsset: pallet_zk_asset,
    }
);

/// Fresh externalities with a convertible registry for [`ASSET`] at moment 1.
pub fn new_test_ext() -> sp_io::TestExternalities {
    let t = frame_system::GenesisConfig::<Runtime>::default()
        .build_storage()
        .unwrap();
    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| {
        System::set_block_number(1);
        Timestamp::set_timestamp(1);
        assert_ok!(Registry::create_registry(RuntimeOrigin::root(), ASSET, 1, true));
    });
    ext
}

// --- Notes and proofs ---------------------------------------------------------

pub fn address(who: AccountId) -> Address {
    LowBytesMapping::to_address(&who)
}

pub fn key(seed: u8) -> ecdsa::Pair {
    ecdsa::Pair::from_seed(&[seed; 32])
}

/// Ethereum-style address of `pair`.
pub fn eth_address(pair: &ecdsa::Pair) -> Address {
    let digest = [1u8; 32];
    let signature = EcdsaSignature::from_rsv(pair.sign_prehashed(&digest).as_ref()).unwrap();
    recover_signer(&digest, &signature).unwrap()
}

pub fn metadata_granting(addresses: &[Address]) -> Vec<u8> {
    NoteMetadata {
        ephemeral_key: [2; 33],
        approved_addresses: addresses.to_vec(),
        encrypted_view_keys: vec![0xee; 16],
        app_data: vec![],
    }
    .encode()
}

/// Note whose hash matches its commitment.
pub fn note(owner: Address, seed: u8) -> NoteEntry {
    note_with_metadata(owner, seed, vec![])
}

pub fn note_with_metadata(owner: Address, seed: u8, metadata: Vec<u8>) -> NoteEntry {
    let commitment = [seed; 64];
    NoteEntry { owner, note_hash: keccak_256(&commitment), commitment, metadata }
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

/// Create `notes` through a self-authorized transfer with no inputs.
pub fn seed_notes(notes: Vec<NoteEntry>) {
    let mint = transition(vec![], notes);
    assert_ok!(ZkAsset::transfer(
        RuntimeOrigin::signed(CHARLIE),
        ASSET,
        JOIN_SPLIT.0,
        payload([0; 32], &[mint]).try_into().unwrap(),
        Default::default(),
    ));
}

pub fn sign_digest(pair: &ecdsa::Pair, hash_struct: &[u8; 32]) -> EcdsaSignature {
    let digest = typed_data_digest(&ZkAsset::domain_separator(ASSET), hash_struct);
    EcdsaSignature::from_rsv(pair.sign_prehashed(&digest).as_ref()).unwrap()
}

/// Packed join-split signature of `pair` over `note_hash` for a transfer
/// submitted by `submitter`.
pub fn sign_spend(
    pair: &ecdsa::Pair,
    note_hash: &NoteHash,
    challenge: &[u8; 32],
    submitter: AccountId,
) -> Vec<u8> {
    let message = join_split_hash_struct(JOIN_SPLIT, note_hash, challenge, &address(submitter));
    sign_digest(pair, &message).to_vrs_words().to_vec()
}

/// 65-byte note approval signature of `pair`.
pub fn sign_approval(
    pair: &ecdsa::Pair,
    note_hash: &NoteHash,
    spender: &Address,
    approved: bool,
) -> Vec<u8> {
    sign_digest(pair, &note_approval_hash_struct(note_hash, spender, approved))
        .to_rsv()
        .to_vec()
}

/// Secp256k1 group order, big-endian.
const ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// Re-encode a 65-byte `r || s || v` signature as `r || n - s || v ^ 1`.
pub fn flip_s(rsv: &[u8]) -> Vec<u8> {
    let mut out = rsv.to_vec();
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let d = ORDER[i] as i16 - rsv[32 + i] as i16 - borrow;
        borrow = (d < 0) as i16;
        out[32 + i] = (d + 256 * borrow) as u8;
    }
    out[64] ^= 1;
    out
}
