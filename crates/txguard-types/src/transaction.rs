//! # Transaction model and wire codec
//!
//! A [`Transaction`] is an ordered bundle of instructions plus the signer and
//! fee-payer metadata needed to submit it as one unit. Its [`Message`] is the
//! signable payload: every signature covers exactly `message.serialize()`,
//! and the integrity hash recorded at build time is taken over the same bytes.
//!
//! ## Wire format
//!
//! ```text
//! transaction := shortvec<signature[64]> message
//! message     := header[3] shortvec<pubkey[32]> blockhash[32] shortvec<instruction>
//! instruction := program_id_index[1] shortvec<u8 account index> shortvec<u8 data>
//! ```
//!
//! `shortvec` lengths are compact-u16: 7 bits per byte, high bit set on every
//! byte but the last, at most 3 bytes. On the wire the serialized bytes are
//! carried as standard base64.
//!
//! ## Account ordering
//!
//! Account keys are ordered: fee payer first, then writable signers,
//! read-only signers, writable non-signers, read-only non-signers. The first
//! `num_required_signatures` keys own one signature slot each, in order.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

use crate::{Blockhash, Pubkey, Result, TxGuardError, TxSignature, constants};

// ---------------------------------------------------------------------------
// Uncompiled instruction (what instruction builders produce)
// ---------------------------------------------------------------------------

/// An account referenced by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    /// A writable account.
    #[must_use]
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    /// A read-only account.
    #[must_use]
    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation before account keys are compiled into indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Compiled message
// ---------------------------------------------------------------------------

/// Counts describing which account keys sign and which are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

/// An instruction whose program and accounts are indices into `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signable payload of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions into a message paid for by `fee_payer`.
    ///
    /// # Errors
    /// Returns [`TxGuardError::InvalidRequest`] if more than 256 distinct
    /// accounts are referenced, or a header count does not fit in a byte.
    pub fn compile(
        fee_payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: Blockhash,
    ) -> Result<Self> {
        // (key, is_signer, is_writable) in first-seen order; payer pinned at 0.
        let mut keys: Vec<(Pubkey, bool, bool)> = vec![(*fee_payer, true, true)];
        let mut upsert = |key: Pubkey, signer: bool, writable: bool| {
            if let Some(entry) = keys.iter_mut().find(|(k, _, _)| *k == key) {
                entry.1 |= signer;
                entry.2 |= writable;
            } else {
                keys.push((key, signer, writable));
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        keys[1..].sort_by_key(|(_, signer, writable)| match (signer, writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if keys.len() > usize::from(u8::MAX) + 1 {
            return Err(TxGuardError::InvalidRequest {
                reason: format!("too many accounts: {}", keys.len()),
            });
        }

        let count = |what: &str, f: fn(&(Pubkey, bool, bool)) -> bool| -> Result<u8> {
            let n = keys.iter().filter(|k| f(k)).count();
            u8::try_from(n).map_err(|_| TxGuardError::InvalidRequest {
                reason: format!("too many {what}: {n}"),
            })
        };
        let header = MessageHeader {
            num_required_signatures: count("signers", |(_, s, _)| *s)?,
            num_readonly_signed: count("read-only signers", |(_, s, w)| *s && !*w)?,
            num_readonly_unsigned: count("read-only accounts", |(_, s, w)| !*s && !*w)?,
        };

        let account_keys: Vec<Pubkey> = keys.into_iter().map(|(k, _, _)| k).collect();
        let index_of = |key: &Pubkey| -> Result<u8> {
            let pos = account_keys
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| TxGuardError::Internal(format!("account {key} not compiled")))?;
            u8::try_from(pos).map_err(|_| TxGuardError::Internal("account index overflow".into()))
        };

        let compiled = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| index_of(&meta.pubkey))
                        .collect::<Result<Vec<_>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    /// The account paying for inclusion: the first key, if it signs.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        if self.header.num_required_signatures == 0 {
            return None;
        }
        self.account_keys.first()
    }

    /// Keys that own a signature slot, in slot order.
    #[must_use]
    pub fn signer_keys(&self) -> &[Pubkey] {
        let n = usize::from(self.header.num_required_signatures).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// Canonical signable bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed);
        out.push(self.header.num_readonly_unsigned);
        encode_len(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());
        encode_len(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_len(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let header = MessageHeader {
            num_required_signatures: reader.byte()?,
            num_readonly_signed: reader.byte()?,
            num_readonly_unsigned: reader.byte()?,
        };
        let key_count = reader.len()?;
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            account_keys.push(Pubkey(reader.array()?));
        }
        let recent_blockhash = Blockhash(reader.array()?);
        let ix_count = reader.len()?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = reader.byte()?;
            let n = reader.len()?;
            let accounts = reader.bytes(n)?.to_vec();
            let n = reader.len()?;
            let data = reader.bytes(n)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }
        let message = Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        };
        message.sanitize()?;
        Ok(message)
    }

    /// Structural checks a decoded message must pass.
    fn sanitize(&self) -> Result<()> {
        let keys = self.account_keys.len();
        let signers = usize::from(self.header.num_required_signatures);
        if signers > keys {
            return Err(malformed("more required signatures than account keys"));
        }
        if usize::from(self.header.num_readonly_signed) > signers {
            return Err(malformed("read-only signer count exceeds signer count"));
        }
        if usize::from(self.header.num_readonly_unsigned) > keys - signers {
            return Err(malformed("read-only unsigned count exceeds unsigned keys"));
        }
        for ix in &self.instructions {
            if usize::from(ix.program_id_index) >= keys {
                return Err(malformed("program id index out of range"));
            }
            if ix.accounts.iter().any(|i| usize::from(*i) >= keys) {
                return Err(malformed("account index out of range"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A message plus one signature slot per required signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub signatures: Vec<TxSignature>,
    pub message: Message,
}

impl Transaction {
    /// Wrap a message with every signature slot empty.
    #[must_use]
    pub fn new_unsigned(message: Message) -> Self {
        let slots = usize::from(message.header.num_required_signatures);
        Self {
            signatures: vec![TxSignature::default(); slots],
            message,
        }
    }

    /// Shortcut for [`Message::fee_payer`].
    #[must_use]
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.message.fee_payer()
    }

    /// Index of the signature slot owned by `key`, if it is a signer.
    #[must_use]
    pub fn signer_position(&self, key: &Pubkey) -> Option<usize> {
        self.message.signer_keys().iter().position(|k| k == key)
    }

    /// The populated signature for `key`, if any.
    #[must_use]
    pub fn signature_for(&self, key: &Pubkey) -> Option<&TxSignature> {
        let pos = self.signer_position(key)?;
        self.signatures.get(pos).filter(|sig| !sig.is_zero())
    }

    /// Whether every signature slot is populated.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.signatures.len() == self.message.signer_keys().len()
            && self.signatures.iter().all(|s| !s.is_zero())
    }

    /// Sign the message with `key`, filling the slot that key owns.
    ///
    /// # Errors
    /// Returns [`TxGuardError::Signing`] if `key` is not a required signer.
    pub fn partial_sign(&mut self, key: &SigningKey) -> Result<()> {
        let pubkey = Pubkey::from(&key.verifying_key());
        let pos = self.signer_position(&pubkey).ok_or_else(|| {
            TxGuardError::Signing(format!("{} is not a required signer", pubkey.short()))
        })?;
        if self.signatures.len() != self.message.signer_keys().len() {
            self.signatures
                .resize(self.message.signer_keys().len(), TxSignature::default());
        }
        let signature = key.sign(&self.message.serialize());
        self.signatures[pos] = TxSignature::from(signature);
        Ok(())
    }

    /// Full wire bytes: signatures followed by the message.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 * self.signatures.len() + 256);
        encode_len(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig.as_bytes());
        }
        out.extend_from_slice(&self.message.serialize());
        out
    }

    /// Exact inverse of [`Transaction::serialize`].
    ///
    /// # Errors
    /// Returns [`TxGuardError::MalformedTransaction`] on truncated input,
    /// trailing bytes, oversize input, a signature count that disagrees with
    /// the header, or out-of-range account indices.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > constants::MAX_TRANSACTION_SIZE {
            return Err(malformed(&format!(
                "{} bytes exceeds limit of {}",
                bytes.len(),
                constants::MAX_TRANSACTION_SIZE
            )));
        }
        let mut reader = Reader::new(bytes);
        let sig_count = reader.len()?;
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            signatures.push(TxSignature(reader.array()?));
        }
        let message = Message::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(malformed("trailing bytes after message"));
        }
        if signatures.len() != usize::from(message.header.num_required_signatures) {
            return Err(malformed("signature count does not match header"));
        }
        Ok(Self {
            signatures,
            message,
        })
    }

    /// Base64 transport encoding.
    #[must_use]
    pub fn to_wire(&self) -> String {
        BASE64.encode(self.serialize())
    }

    /// Decode the base64 transport encoding.
    ///
    /// # Errors
    /// Returns [`TxGuardError::MalformedTransaction`] if the text is not
    /// base64 or the bytes do not decode.
    pub fn from_wire(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| malformed(&format!("invalid base64: {e}")))?;
        Self::deserialize(&bytes)
    }
}

// ---------------------------------------------------------------------------
// compact-u16 codec
// ---------------------------------------------------------------------------

fn malformed(reason: &str) -> TxGuardError {
    TxGuardError::MalformedTransaction {
        reason: reason.to_string(),
    }
}

fn encode_len(out: &mut Vec<u8>, len: usize) {
    let mut rem = len;
    loop {
        // Truncation intended: only the low 7 bits are kept.
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed("unexpected end of input"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Decode a compact-u16 length.
    fn len(&mut self) -> Result<usize> {
        let mut value: usize = 0;
        for i in 0..3 {
            let byte = self.byte()?;
            value |= usize::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                if i > 0 && byte == 0 {
                    return Err(malformed("non-canonical length encoding"));
                }
                if value > usize::from(u16::MAX) {
                    return Err(malformed("length overflows u16"));
                }
                return Ok(value);
            }
        }
        Err(malformed("length longer than 3 bytes"))
    }
}
