use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;
use crate::host::{Host, HostError};
use crate::ledger::{LedgerSnapshot, TokenMetadata};
use crate::treasury::TreasuryRecord;

pub const STATE_VERSION: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file io: {0}")]
    Io(#[from] io::Error),
    #[error("state file encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state file rejected: {0}")]
    Rejected(#[from] HostError),
    #[error("unsupported state file version {0}")]
    UnsupportedVersion(u8),
}

/// Everything the host persists between invocations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateFile {
    pub version: u8,
    pub token: TokenMetadata,
    pub ledger: LedgerSnapshot,
    pub treasury: TreasuryRecord,
    /// Highest applied nonce per signer.
    pub nonces: BTreeMap<Address, u64>,
}

impl StateFile {
    pub fn capture(host: &Host) -> Self {
        Self {
            version: STATE_VERSION,
            token: host.token().clone(),
            ledger: host.ledger().snapshot(),
            treasury: host.treasury().record(),
            nonces: host.nonces().clone(),
        }
    }

    pub fn into_host(self) -> Result<Host, StateError> {
        if self.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion(self.version));
        }
        Ok(Host::restore(
            self.token,
            self.ledger,
            self.treasury,
            self.nonces,
        )?)
    }

    pub fn load(path: &Path) -> Result<Self, StateError> {
        let bytes = fs::read(path)?;
        let state: Self = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), height = state.ledger.meta.height, "state loaded");
        Ok(state)
    }

    /// Writes to a sibling temp file first so an interrupted save never
    /// leaves a truncated state behind.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "state saved");
        Ok(())
    }
}
