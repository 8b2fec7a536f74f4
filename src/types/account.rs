use crate::errors::{LedgerError, LedgerResult};
use crate::serializer::Serializer;

use super::AccountId;

/// Balance and replay-protection sequence for one account.
///
/// The serialized form is the canonical byte layout committed into the
/// account state map: balance (8 bytes big-endian) followed by the sequence
/// (4 bytes big-endian). Parsers ignore trailing bytes so later revisions can
/// append fields without breaking older readers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountState {
    account_id: AccountId,
    balance: u64,
    seq: u32,
}

const ACCOUNT_STATE_LEN: usize = 12;

impl AccountState {
    /// Fresh account with zero balance and sequence zero.
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance: 0,
            seq: 0,
        }
    }

    /// Decode from map bytes; the id is the map key, not part of the value.
    pub fn parse(account_id: AccountId, data: &[u8]) -> LedgerResult<Self> {
        if data.len() < ACCOUNT_STATE_LEN {
            return Err(LedgerError::Codec(format!(
                "account state needs {ACCOUNT_STATE_LEN} bytes, got {}",
                data.len()
            )));
        }
        let balance = u64::from_be_bytes(data[..8].try_into().expect("8 bytes"));
        let seq = u32::from_be_bytes(data[8..12].try_into().expect("4 bytes"));
        Ok(Self {
            account_id,
            balance,
            seq,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut s = Serializer::with_capacity(ACCOUNT_STATE_LEN);
        s.add64(self.balance);
        s.add32(self.seq);
        s.into_bytes()
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn credit(&mut self, amount: u64) -> LedgerResult<()> {
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            LedgerError::Arithmetic(format!(
                "balance overflow crediting {amount} to account {}",
                self.account_id
            ))
        })?;
        Ok(())
    }

    pub fn charge(&mut self, amount: u64) -> LedgerResult<()> {
        self.balance = self.balance.checked_sub(amount).ok_or_else(|| {
            LedgerError::Arithmetic(format!(
                "balance underflow charging {amount} to account {}",
                self.account_id
            ))
        })?;
        Ok(())
    }

    pub fn inc_seq(&mut self) -> LedgerResult<()> {
        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| LedgerError::Arithmetic("account sequence overflow".into()))?;
        Ok(())
    }

    pub fn dec_seq(&mut self) -> LedgerResult<()> {
        self.seq = self
            .seq
            .checked_sub(1)
            .ok_or_else(|| LedgerError::Arithmetic("account sequence underflow".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountState {
        AccountState::new(AccountId::from_bytes([7u8; 20]))
    }

    #[test]
    fn serialize_parse_round_trip() {
        let mut state = account();
        state.credit(100_000).unwrap();
        state.inc_seq().unwrap();
        let parsed = AccountState::parse(*state.account_id(), &state.serialize()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn parse_tolerates_trailing_bytes() {
        let mut bytes = account().serialize();
        bytes.extend_from_slice(&[0xde, 0xad]);
        let parsed = AccountState::parse(AccountId::from_bytes([7u8; 20]), &bytes).unwrap();
        assert_eq!(parsed.balance(), 0);
        assert_eq!(parsed.seq(), 0);
    }

    #[test]
    fn parse_rejects_short_input() {
        assert!(AccountState::parse(AccountId::default(), &[0u8; 11]).is_err());
    }

    #[test]
    fn credit_and_charge_move_balance() {
        let mut state = account();
        state.credit(500).unwrap();
        state.charge(200).unwrap();
        assert_eq!(state.balance(), 300);
    }

    #[test]
    fn charge_past_zero_is_fatal() {
        let mut state = account();
        state.credit(10).unwrap();
        assert!(matches!(
            state.charge(11),
            Err(LedgerError::Arithmetic(_))
        ));
    }

    #[test]
    fn credit_overflow_is_fatal() {
        let mut state = account();
        state.credit(u64::MAX).unwrap();
        assert!(matches!(state.credit(1), Err(LedgerError::Arithmetic(_))));
    }

    #[test]
    fn seq_underflow_is_fatal() {
        let mut state = account();
        assert!(matches!(state.dec_seq(), Err(LedgerError::Arithmetic(_))));
        state.inc_seq().unwrap();
        state.dec_seq().unwrap();
        assert_eq!(state.seq(), 0);
    }
}
