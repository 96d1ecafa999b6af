//! Server-held signing key.

use std::fmt;

use ed25519_dalek::SigningKey;
use txguard_types::{Pubkey, Result, Transaction};

/// Adds the server's signature to a client-signed transaction.
pub trait CustodialSigner: Send + Sync {
    fn public_key(&self) -> Pubkey;

    /// Fill the slot owned by [`public_key`](Self::public_key).
    ///
    /// # Errors
    /// [`TxGuardError::Signing`](txguard_types::TxGuardError::Signing) if the
    /// key has no slot in `tx`.
    fn co_sign(&self, tx: &mut Transaction) -> Result<()>;
}

/// [`CustodialSigner`] backed by an in-memory ed25519 key.
pub struct KeypairSigner {
    key: SigningKey,
    public: Pubkey,
}

impl KeypairSigner {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let public = Pubkey::from(&key.verifying_key());
        Self { key, public }
    }
}

impl CustodialSigner for KeypairSigner {
    fn public_key(&self) -> Pubkey {
        self.public
    }

    fn co_sign(&self, tx: &mut Transaction) -> Result<()> {
        tx.partial_sign(&self.key)
    }
}

impl fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("public", &self.public.short())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use txguard_types::{AccountMeta, Blockhash, Instruction, Message, TxGuardError};

    use super::*;

    #[test]
    fn debug_hides_secret() {
        let key = SigningKey::from_bytes(&[0x5a; 32]);
        let signer = KeypairSigner::new(key);
        let out = format!("{signer:?}");
        assert!(!out.contains("5a5a5a5a"));
        assert!(!out.contains("90, 90"));
        assert!(out.contains(&signer.public_key().short()));
    }

    #[test]
    fn co_sign_requires_slot() {
        let signer = KeypairSigner::new(SigningKey::generate(&mut OsRng));
        let ix = Instruction {
            program_id: Pubkey([7u8; 32]),
            accounts: vec![AccountMeta::readonly(Pubkey([8u8; 32]), false)],
            data: vec![1],
        };

        let mut own = Transaction::new_unsigned(
            Message::compile(&signer.public_key(), &[ix.clone()], Blockhash([1u8; 32])).unwrap(),
        );
        signer.co_sign(&mut own).unwrap();
        assert!(own.signature_for(&signer.public_key()).is_some());

        let mut foreign = Transaction::new_unsigned(
            Message::compile(&Pubkey([9u8; 32]), &[ix], Blockhash([1u8; 32])).unwrap(),
        );
        assert!(matches!(
            signer.co_sign(&mut foreign),
            Err(TxGuardError::Signing(_))
        ));
    }
}
