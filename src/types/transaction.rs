use crate::errors::{LedgerError, LedgerResult};
use crate::serializer::Serializer;

use super::{AccountId, Hash256};

/// Processing status of a transaction. Only the in-memory record carries it;
/// the signed bytes, and therefore the id, never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransStatus {
    New,
    Invalid,
    Included,
    Committed,
    Removed,
    Held,
}

/// Signed value transfer. The signature is opaque to the engine: it is
/// assumed to have been verified upstream and only participates in the
/// canonical byte encoding that determines the content-addressed id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    from: AccountId,
    to: AccountId,
    amount: u64,
    fee: u64,
    from_seq: u32,
    source_ledger: u32,
    signature: Vec<u8>,
    status: TransStatus,
    status_ledger: u32,
    id: Hash256,
}

// from + to + amount + fee + from_seq + source_ledger + signature length
const SIGNED_FIXED_LEN: usize = 20 + 20 + 8 + 8 + 4 + 4 + 2;

impl Transaction {
    pub fn new(
        from: AccountId,
        to: AccountId,
        amount: u64,
        fee: u64,
        from_seq: u32,
        source_ledger: u32,
        signature: Vec<u8>,
    ) -> Self {
        let mut tx = Self {
            from,
            to,
            amount,
            fee,
            from_seq,
            source_ledger,
            signature,
            status: TransStatus::New,
            status_ledger: 0,
            id: Hash256::ZERO,
        };
        tx.id = tx.compute_id();
        debug_assert!(!tx.id.is_zero());
        tx
    }

    /// Decode the canonical signed form, as stored in a transaction map.
    pub fn parse(data: &[u8]) -> LedgerResult<Self> {
        if data.len() < SIGNED_FIXED_LEN {
            return Err(LedgerError::Codec(format!(
                "transaction needs at least {SIGNED_FIXED_LEN} bytes, got {}",
                data.len()
            )));
        }
        let from = AccountId::from_slice(&data[..20])?;
        let to = AccountId::from_slice(&data[20..40])?;
        let amount = u64::from_be_bytes(data[40..48].try_into().expect("8 bytes"));
        let fee = u64::from_be_bytes(data[48..56].try_into().expect("8 bytes"));
        let from_seq = u32::from_be_bytes(data[56..60].try_into().expect("4 bytes"));
        let source_ledger = u32::from_be_bytes(data[60..64].try_into().expect("4 bytes"));
        let sig_len = u16::from_be_bytes(data[64..66].try_into().expect("2 bytes")) as usize;
        if data.len() != SIGNED_FIXED_LEN + sig_len {
            return Err(LedgerError::Codec(format!(
                "transaction signature length {sig_len} does not match payload"
            )));
        }
        let signature = data[66..].to_vec();
        Ok(Self::new(
            from,
            to,
            amount,
            fee,
            from_seq,
            source_ledger,
            signature,
        ))
    }

    /// Canonical byte encoding of the signed form; this is what a
    /// transaction map stores and what the id commits to.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut s = Serializer::with_capacity(SIGNED_FIXED_LEN + self.signature.len());
        s.add160(&self.from);
        s.add160(&self.to);
        s.add64(self.amount);
        s.add64(self.fee);
        s.add32(self.from_seq);
        s.add32(self.source_ledger);
        s.add_var_bytes(&self.signature);
        s.into_bytes()
    }

    fn compute_id(&self) -> Hash256 {
        crate::serializer::sha512_half(&self.signed_bytes())
    }

    pub fn id(&self) -> Hash256 {
        self.id
    }

    pub fn from_account(&self) -> &AccountId {
        &self.from
    }

    pub fn to_account(&self) -> &AccountId {
        &self.to
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn from_account_seq(&self) -> u32 {
        self.from_seq
    }

    pub fn source_ledger(&self) -> u32 {
        self.source_ledger
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn status(&self) -> TransStatus {
        self.status
    }

    /// Ledger sequence recorded with the most recent status change.
    pub fn status_ledger(&self) -> u32 {
        self.status_ledger
    }

    pub fn set_status(&mut self, status: TransStatus, ledger_seq: u32) {
        self.status = status;
        self.status_ledger = ledger_seq;
    }
}
