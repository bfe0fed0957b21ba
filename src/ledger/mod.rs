use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::address::Address;
use crate::error::ErrorKind;

pub type Amount = u128;

pub const DECIMALS: u8 = 18;
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000; // 1 HNY = 1e18 minimal units

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Honey::_transferTokens: transfer amount exceeds balance")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        amount: Amount,
    },
    #[error("Honey::_transferTokens: cannot transfer to the zero address")]
    InvalidRecipient,
    #[error("Honey::_transferTokens: cannot transfer from the zero address")]
    InvalidSender,
    #[error("Honey::_transferTokens: transfer amount overflows")]
    Overflow,
    #[error("ledger balances do not sum to total supply {total_supply}")]
    ConservationViolated { total_supply: Amount },
    #[error("ledger state root does not match snapshot")]
    StateRootMismatch,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::InvalidRecipient => ErrorKind::InvalidRecipient,
            LedgerError::InvalidSender => ErrorKind::InvalidSender,
            LedgerError::Overflow => ErrorKind::Overflow,
            LedgerError::ConservationViolated { .. } | LedgerError::StateRootMismatch => {
                ErrorKind::CorruptState
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "Honey".into(),
            symbol: "HNY".into(),
            decimals: DECIMALS,
        }
    }
}

/// A committed balance movement. Minting is recorded with `from` set to the
/// zero address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    #[serde(with = "crate::encoding::amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of committed balance movements, mint included.
    pub height: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    #[serde(with = "crate::encoding::amount")]
    pub total_supply: Amount,
    #[serde(with = "crate::encoding::amount_map")]
    pub balances: BTreeMap<Address, Amount>,
    pub events: Vec<TransferEvent>,
    #[serde(with = "crate::encoding::hex_digest")]
    pub state_root: [u8; 32],
}

#[derive(Default)]
struct LedgerState {
    meta: SnapshotMetadata,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    events: Vec<TransferEvent>,
}

impl LedgerState {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn set_balance(&mut self, account: &Address, balance: Amount) {
        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, balance);
        }
    }

    // Every check runs before the first write, so a rejected transfer
    // leaves the state untouched.
    fn apply_transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                balance: from_balance,
                amount,
            });
        }
        if from != to {
            let credited = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            self.set_balance(from, from_balance - amount);
            self.set_balance(to, credited);
        }
        self.events.push(TransferEvent {
            from: *from,
            to: *to,
            amount,
        });
        self.meta.height += 1;
        Ok(())
    }

    fn check_conservation(&self) -> Result<(), LedgerError> {
        let sum = self
            .balances
            .values()
            .try_fold(0 as Amount, |acc, b| acc.checked_add(*b));
        if sum != Some(self.total_supply) {
            return Err(LedgerError::ConservationViolated {
                total_supply: self.total_supply,
            });
        }
        Ok(())
    }
}

/// The Honey token ledger.
///
/// Total supply is minted once at creation; from then on [`Ledger::transfer`]
/// is the only mutation and it never changes the supply. Each transfer runs
/// under the write lock, so readers never see one side of a movement without
/// the other.
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Mints `initial_supply` to `initial_holder`.
    pub fn create(initial_holder: Address, initial_supply: Amount) -> Result<Self, LedgerError> {
        if initial_holder.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        let mut state = LedgerState {
            total_supply: initial_supply,
            ..LedgerState::default()
        };
        state.set_balance(&initial_holder, initial_supply);
        state.events.push(TransferEvent {
            from: Address::ZERO,
            to: initial_holder,
            amount: initial_supply,
        });
        state.meta.height = 1;
        info!(holder = %initial_holder, supply = %initial_supply, "ledger created");
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Rebuilds a ledger from a snapshot, refusing one whose balances do not
    /// add up to the supply or whose root does not match its balances.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut state = LedgerState {
            meta: snapshot.meta,
            total_supply: snapshot.total_supply,
            balances: BTreeMap::new(),
            events: snapshot.events,
        };
        for (account, balance) in &snapshot.balances {
            state.set_balance(account, *balance);
        }
        state.check_conservation()?;
        if compute_state_root(&state.balances) != snapshot.state_root {
            return Err(LedgerError::StateRootMismatch);
        }
        debug!(
            accounts = state.balances.len(),
            height = state.meta.height,
            "ledger restored"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current balance; unknown accounts hold zero.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.read().balance_of(account)
    }

    pub fn total_supply(&self) -> Amount {
        self.read().total_supply
    }

    pub fn height(&self) -> u64 {
        self.read().meta.height
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// `from` is the authenticated caller: the ledger only supports moving
    /// one's own funds. Burning is not supported, so `to` must be non-zero.
    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        if from.is_zero() {
            return Err(LedgerError::InvalidSender);
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        let mut state = self.write();
        match state.apply_transfer(from, to, amount) {
            Ok(()) => {
                debug!(%from, %to, amount = %amount, height = state.meta.height, "transfer applied");
                Ok(())
            }
            Err(err) => {
                debug!(%from, %to, amount = %amount, error = %err, "transfer rejected");
                Err(err)
            }
        }
    }

    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        self.read().balances.clone()
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.read().events.clone()
    }

    pub fn check_conservation(&self) -> Result<(), LedgerError> {
        self.read().check_conservation()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read();
        LedgerSnapshot {
            meta: state.meta.clone(),
            total_supply: state.total_supply,
            balances: state.balances.clone(),
            events: state.events.clone(),
            state_root: compute_state_root(&state.balances),
        }
    }
}

/// Root over the sorted balance map. Leaves and inner nodes carry distinct
/// tags, inner nodes also their level; an unpaired node is lifted to the next
/// level unchanged. The root commits to the number of accounts.
fn compute_state_root(balances: &BTreeMap<Address, Amount>) -> [u8; 32] {
    let mut level: Vec<[u8; 32]> = balances
        .iter()
        .map(|(account, balance)| {
            Sha256::new()
                .chain_update(b"honey-leaf")
                .chain_update(account.as_bytes())
                .chain_update(balance.to_be_bytes())
                .finalize()
                .into()
        })
        .collect();

    let mut depth: u32 = 0;
    while level.len() > 1 {
        depth += 1;
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => Sha256::new()
                    .chain_update(b"honey-node")
                    .chain_update(depth.to_be_bytes())
                    .chain_update(left)
                    .chain_update(right)
                    .finalize()
                    .into(),
                _ => pair[0],
            })
            .collect();
    }

    let top = level.first().copied().unwrap_or([0u8; 32]);
    Sha256::new()
        .chain_update(b"honey-root")
        .chain_update((balances.len() as u64).to_be_bytes())
        .chain_update(top)
        .finalize()
        .into()
}
