use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::error::ErrorKind;
use crate::ledger::{Amount, Ledger, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreasuryError {
    #[error("Ownable: caller is not the owner")]
    NotOwner,
    #[error("Ownable: new owner is the zero address")]
    InvalidOwner,
    #[error("treasury record rejected: {0}")]
    CorruptRecord(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TreasuryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreasuryError::NotOwner => ErrorKind::NotOwner,
            TreasuryError::InvalidOwner => ErrorKind::InvalidOwner,
            TreasuryError::CorruptRecord(_) => ErrorKind::CorruptState,
            TreasuryError::Ledger(err) => err.kind(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipTransferred {
    pub previous: Address,
    pub new: Address,
}

/// Persisted form of a treasury: everything except the ledger handle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreasuryRecord {
    pub address: Address,
    pub owner: Address,
    pub events: Vec<OwnershipTransferred>,
}

struct OwnerState {
    owner: Address,
    events: Vec<OwnershipTransferred>,
}

impl OwnerState {
    // The zero owner never matches, not even a caller claiming the zero
    // address, which is what makes renouncement final.
    fn only_owner(&self, caller: &Address) -> Result<(), TreasuryError> {
        if self.owner.is_zero() || self.owner != *caller {
            return Err(TreasuryError::NotOwner);
        }
        Ok(())
    }

    fn set_owner(&mut self, new: Address) {
        let previous = std::mem::replace(&mut self.owner, new);
        self.events.push(OwnershipTransferred { previous, new });
    }
}

/// Custodian of a single ledger account, gated by one owner.
///
/// The treasury's funds are the ledger balance of [`Treasury::address`];
/// only the current owner may move them. Mutating calls hold the owner lock
/// for their whole duration, so the authorization decision and the ledger
/// movement it guards are never interleaved with an ownership change.
pub struct Treasury {
    ledger: Arc<Ledger>,
    address: Address,
    state: RwLock<OwnerState>,
}

impl Treasury {
    /// Creates a treasury at `address`, owned by `creator`.
    pub fn new(ledger: Arc<Ledger>, creator: Address, address: Address) -> Result<Self, TreasuryError> {
        if creator.is_zero() {
            return Err(TreasuryError::InvalidOwner);
        }
        if address.is_zero() {
            return Err(LedgerError::InvalidRecipient.into());
        }
        let mut state = OwnerState {
            owner: Address::ZERO,
            events: Vec::new(),
        };
        state.set_owner(creator);
        info!(treasury = %address, owner = %creator, "treasury created");
        Ok(Self {
            ledger,
            address,
            state: RwLock::new(state),
        })
    }

    /// Rebuilds a treasury from its record. The ownership history must form
    /// an unbroken chain from the zero address and end at the recorded owner.
    pub fn restore(ledger: Arc<Ledger>, record: TreasuryRecord) -> Result<Self, TreasuryError> {
        if record.address.is_zero() {
            return Err(TreasuryError::CorruptRecord("zero treasury address"));
        }
        let mut owner = Address::ZERO;
        for event in &record.events {
            if event.previous != owner {
                warn!(treasury = %record.address, "ownership history is broken");
                return Err(TreasuryError::CorruptRecord("ownership history is broken"));
            }
            owner = event.new;
        }
        if record.events.is_empty() || owner != record.owner {
            warn!(treasury = %record.address, owner = %record.owner, "owner disagrees with history");
            return Err(TreasuryError::CorruptRecord("owner disagrees with ownership history"));
        }
        Ok(Self {
            ledger,
            address: record.address,
            state: RwLock::new(OwnerState {
                owner: record.owner,
                events: record.events,
            }),
        })
    }

    pub fn record(&self) -> TreasuryRecord {
        let state = self.read();
        TreasuryRecord {
            address: self.address,
            owner: state.owner,
            events: state.events.clone(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, OwnerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, OwnerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The ledger account this treasury holds funds in.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner; the zero address once ownership is renounced.
    pub fn owner(&self) -> Address {
        self.read().owner
    }

    pub fn is_renounced(&self) -> bool {
        self.owner().is_zero()
    }

    pub fn ownership_events(&self) -> Vec<OwnershipTransferred> {
        self.read().events.clone()
    }

    pub fn balance(&self) -> Amount {
        self.ledger.balance_of(&self.address)
    }

    /// Pays `amount` out of the treasury to `to`. Owner only.
    pub fn transfer(&self, caller: &Address, to: &Address, amount: Amount) -> Result<(), TreasuryError> {
        let state = self.write();
        if let Err(err) = state.only_owner(caller) {
            warn!(treasury = %self.address, %caller, "unauthorized treasury transfer");
            return Err(err);
        }
        self.ledger.transfer(&self.address, to, amount)?;
        info!(treasury = %self.address, %to, amount = %amount, "treasury paid out");
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: &Address, new_owner: &Address) -> Result<(), TreasuryError> {
        let mut state = self.write();
        state.only_owner(caller)?;
        if new_owner.is_zero() {
            return Err(TreasuryError::InvalidOwner);
        }
        state.set_owner(*new_owner);
        info!(treasury = %self.address, previous = %caller, new = %new_owner, "ownership transferred");
        Ok(())
    }

    /// Gives up ownership for good. Every owner-only call fails afterwards.
    pub fn renounce_ownership(&self, caller: &Address) -> Result<(), TreasuryError> {
        let mut state = self.write();
        state.only_owner(caller)?;
        state.set_owner(Address::ZERO);
        info!(treasury = %self.address, previous = %caller, "ownership renounced");
        debug!(events = state.events.len(), "ownership log");
        Ok(())
    }
}
