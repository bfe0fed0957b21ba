//! Honey community treasury.
//!
//! Two components make up the core:
//!
//! * [`ledger`] — the Honey token ledger: balances, total supply and a
//!   conservation-checked transfer primitive.
//! * [`treasury`] — a single-owner custodian of one ledger account, able to
//!   pay out, hand over ownership or renounce it for good.
//!
//! Around them sits a small local host used by the CLI: [`auth`] turns
//! ed25519-signed calls into caller addresses, [`host`] dispatches them and
//! rejects replays, [`state`] persists everything as JSON and [`config`]
//! reads the optional TOML settings.

pub mod address;
pub mod auth;
pub mod config;
pub mod error;
pub mod host;
pub mod ledger;
pub mod state;
pub mod treasury;

mod encoding;

pub use address::Address;
pub use error::ErrorKind;
pub use ledger::{Amount, Ledger, LedgerError};
pub use treasury::{Treasury, TreasuryError};
