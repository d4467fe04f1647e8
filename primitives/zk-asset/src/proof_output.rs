//! Binary layout of validated proof outputs.
//!
//! All integers are big-endian; every variable section carries a `u32` length
//! prefix and decoding must consume the buffer exactly.
//!
//! ```text
//! ProofOutputs := count:u32 || (len:u32 || ProofOutput[len]) * count
//! ProofOutput  := public_owner[20] || public_value:i128[16] || challenge[32]
//!                 || in_len:u32 || Notes[in_len] || out_len:u32 || Notes[out_len]
//! Notes        := count:u32 || NoteEntry * count
//! NoteEntry    := owner[20] || note_hash[32] || commitment[64]
//!                 || meta_len:u32 || metadata[meta_len]
//! ```

use alloc::vec::Vec;

use crate::{Address, NoteCommitment, NoteHash};

/// Smallest encoded note: fixed fields plus an empty metadata length.
const NOTE_MIN_LEN: usize = 20 + 32 + 64 + 4;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CodecError {
    /// A length field points past the end of its buffer.
    UnexpectedEnd,
    /// A section was longer than its contents.
    TrailingBytes,
    /// A section does not fit in a `u32` length prefix.
    TooLong,
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEnd)?;
        let out = self.buf.get(self.pos..end).ok_or(CodecError::UnexpectedEnd)?;
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// A `u32`-prefixed section.
    pub(crate) fn section(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub(crate) fn finish(self) -> Result<(), CodecError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }
}

fn put_section(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len()).map_err(|_| CodecError::TooLong)?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// One input or output note of a proof output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NoteEntry {
    pub owner: Address,
    pub note_hash: NoteHash,
    pub commitment: NoteCommitment,
    pub metadata: Vec<u8>,
}

impl NoteEntry {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            owner: reader.array()?,
            note_hash: reader.array()?,
            commitment: reader.array()?,
            metadata: reader.section()?.to_vec(),
        })
    }

    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&self.owner);
        out.extend_from_slice(&self.note_hash);
        out.extend_from_slice(&self.commitment);
        put_section(out, &self.metadata)
    }
}

fn decode_notes(bytes: &[u8]) -> Result<Vec<NoteEntry>, CodecError> {
    let mut reader = Reader::new(bytes);
    let count = reader.u32()? as usize;
    // The count is untrusted; never reserve more than the buffer could hold.
    let mut notes = Vec::with_capacity(count.min(reader.remaining() / NOTE_MIN_LEN));
    for _ in 0..count {
        notes.push(NoteEntry::decode_from(&mut reader)?);
    }
    reader.finish()?;
    Ok(notes)
}

fn encode_notes(notes: &[NoteEntry]) -> Result<Vec<u8>, CodecError> {
    let count = u32::try_from(notes.len()).map_err(|_| CodecError::TooLong)?;
    let mut out = Vec::new();
    out.extend_from_slice(&count.to_be_bytes());
    for note in notes {
        note.encode_to(&mut out)?;
    }
    Ok(out)
}

/// A single transition: notes destroyed, notes created and the public delta.
///
/// `public_value > 0` moves value out of the confidential pool to
/// `public_owner`, `public_value < 0` moves value from `public_owner` into it.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ProofOutput {
    pub input_notes: Vec<NoteEntry>,
    pub output_notes: Vec<NoteEntry>,
    pub public_owner: Address,
    pub public_value: i128,
    pub challenge: [u8; 32],
}

impl ProofOutput {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let public_owner = reader.array()?;
        let public_value = i128::from_be_bytes(reader.array()?);
        let challenge = reader.array()?;
        let input_notes = decode_notes(reader.section()?)?;
        let output_notes = decode_notes(reader.section()?)?;
        reader.finish()?;
        Ok(Self { input_notes, output_notes, public_owner, public_value, challenge })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.public_owner);
        out.extend_from_slice(&self.public_value.to_be_bytes());
        out.extend_from_slice(&self.challenge);
        put_section(&mut out, &encode_notes(&self.input_notes)?)?;
        put_section(&mut out, &encode_notes(&self.output_notes)?)?;
        Ok(out)
    }
}

/// Split a proof-outputs list into the raw bytes of each output, in order.
///
/// The raw slices are what validators and registries hash, so callers should
/// decode each slice rather than re-encode a decoded value.
pub fn split_proof_outputs(bytes: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let mut reader = Reader::new(bytes);
    let count = reader.u32()? as usize;
    let mut outputs = Vec::with_capacity(count.min(reader.remaining() / 4));
    for _ in 0..count {
        outputs.push(reader.section()?);
    }
    reader.finish()?;
    Ok(outputs)
}

pub fn encode_proof_outputs(outputs: &[ProofOutput]) -> Result<Vec<u8>, CodecError> {
    let count = u32::try_from(outputs.len()).map_err(|_| CodecError::TooLong)?;
    let mut out = Vec::new();
    out.extend_from_slice(&count.to_be_bytes());
    for output in outputs {
        put_section(&mut out, &output.encode()?)?;
    }
    Ok(out)
}
