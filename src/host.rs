//! Local execution environment: authenticates signed calls and routes them
//! to the ledger or the treasury.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::address::Address;
use crate::auth::{AuthError, Call, SignedCall};
use crate::error::ErrorKind;
use crate::ledger::{Amount, Ledger, LedgerError, LedgerSnapshot, TokenMetadata};
use crate::treasury::{Treasury, TreasuryError, TreasuryRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Treasury(#[from] TreasuryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl HostError {
    /// Core error category, if the call got past authentication.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            HostError::Auth(_) => None,
            HostError::Treasury(err) => Some(err.kind()),
            HostError::Ledger(err) => Some(err.kind()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub caller: Address,
    pub digest: String,
}

pub struct Host {
    token: TokenMetadata,
    ledger: Arc<Ledger>,
    treasury: Treasury,
    /// Highest nonce applied per signer.
    nonces: BTreeMap<Address, u64>,
}

impl Host {
    /// Mints the supply to `holder` and deploys a treasury owned by
    /// `creator` at the address derived from `(creator, nonce)`.
    pub fn genesis(
        token: TokenMetadata,
        holder: Address,
        supply: Amount,
        creator: Address,
        nonce: u64,
    ) -> Result<Self, HostError> {
        let ledger = Arc::new(Ledger::create(holder, supply)?);
        let address = Address::derive_contract(&creator, nonce);
        let treasury = Treasury::new(ledger.clone(), creator, address)?;
        Ok(Self {
            token,
            ledger,
            treasury,
            nonces: BTreeMap::new(),
        })
    }

    pub fn restore(
        token: TokenMetadata,
        snapshot: LedgerSnapshot,
        record: TreasuryRecord,
        nonces: BTreeMap<Address, u64>,
    ) -> Result<Self, HostError> {
        let ledger = Arc::new(Ledger::restore(snapshot)?);
        let treasury = Treasury::restore(ledger.clone(), record)?;
        Ok(Self {
            token,
            ledger,
            treasury,
            nonces,
        })
    }

    pub fn token(&self) -> &TokenMetadata {
        &self.token
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn nonces(&self) -> &BTreeMap<Address, u64> {
        &self.nonces
    }

    /// Last nonce applied for `caller`, if any of its calls succeeded.
    pub fn last_nonce(&self, caller: &Address) -> Option<u64> {
        self.nonces.get(caller).copied()
    }

    /// Verifies and executes one signed call. Each signer's nonces must
    /// strictly increase; gaps are allowed. The nonce is consumed only when
    /// the call succeeds, so a rejected call can be resubmitted unchanged.
    pub fn submit(&mut self, signed: &SignedCall) -> Result<Receipt, HostError> {
        let caller = signed.verify()?;
        let target = signed.body.target;
        if target != self.treasury.address() {
            return Err(AuthError::WrongTarget {
                expected: self.treasury.address(),
                actual: target,
            }
            .into());
        }
        let nonce = signed.body.nonce;
        if let Some(last) = self.last_nonce(&caller) {
            if nonce <= last {
                warn!(%caller, nonce, last, "stale nonce");
                return Err(AuthError::StaleNonce { caller, nonce, last }.into());
            }
        }

        match &signed.body.call {
            Call::LedgerTransfer { to, amount } => self.ledger.transfer(&caller, to, *amount)?,
            Call::TreasuryTransfer { to, amount } => self.treasury.transfer(&caller, to, *amount)?,
            Call::TransferOwnership { new_owner } => {
                self.treasury.transfer_ownership(&caller, new_owner)?
            }
            Call::RenounceOwnership => self.treasury.renounce_ownership(&caller)?,
        }

        let digest = hex::encode(signed.digest());
        info!(%caller, %digest, nonce, "call applied");
        self.nonces.insert(caller, nonce);
        Ok(Receipt { caller, digest })
    }
}
