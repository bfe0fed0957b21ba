//! Caller authentication for the local host.
//!
//! A [`SignedCall`] binds one treasury operation to a target treasury and a
//! nonce, signed with the caller's ed25519 key. Verification yields the
//! caller [`Address`] the core compares against the owner.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::ledger::Amount;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Call {
    /// Move the caller's own ledger funds.
    LedgerTransfer {
        to: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    TreasuryTransfer {
        to: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    TransferOwnership { new_owner: Address },
    RenounceOwnership,
}

impl Call {
    pub fn commitment(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Call::LedgerTransfer { to, amount } => {
                buf.extend_from_slice(b"ledger_transfer");
                buf.extend_from_slice(to.as_bytes());
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Call::TreasuryTransfer { to, amount } => {
                buf.extend_from_slice(b"treasury_transfer");
                buf.extend_from_slice(to.as_bytes());
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Call::TransferOwnership { new_owner } => {
                buf.extend_from_slice(b"transfer_ownership");
                buf.extend_from_slice(new_owner.as_bytes());
            }
            Call::RenounceOwnership => {
                buf.extend_from_slice(b"renounce_ownership");
            }
        }
        buf
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallBody {
    /// Treasury the call is meant for.
    pub target: Address,
    pub nonce: u64,
    pub call: Call,
}

impl CallBody {
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"honey-call-v1");
        hasher.update(self.target.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.call.commitment());
        hasher.finalize().into()
    }

    pub fn sign(self, key: &SigningKey) -> SignedCall {
        let signature = key.sign(&self.digest());
        SignedCall {
            body: self,
            public_key: key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    pub body: CallBody,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    /// Receipt identifier: the body digest bound to the signer's key, so two
    /// accounts signing the same body get distinct receipts.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"honey-receipt-v1");
        hasher.update(self.body.digest());
        hasher.update(&self.public_key);
        hasher.finalize().into()
    }

    /// Checks the signature and returns the address of the signer.
    pub fn verify(&self) -> Result<Address, AuthError> {
        let key_bytes: [u8; 32] = self
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::MalformedKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| AuthError::MalformedSignature)?;
        key.verify_strict(&self.body.digest(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;
        Ok(Address::from_verifying_key(&key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed caller public key")]
    MalformedKey,
    #[error("malformed call signature")]
    MalformedSignature,
    #[error("call signature does not verify")]
    InvalidSignature,
    #[error("call addressed to treasury {actual}, expected {expected}")]
    WrongTarget { expected: Address, actual: Address },
    #[error("nonce {nonce} from {caller} is not above its last applied nonce {last}")]
    StaleNonce { caller: Address, nonce: u64, last: u64 },
}

/// On-disk form of a caller key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyFile {
    pub address: Address,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub secret_key: Vec<u8>,
}

impl KeyFile {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self::from_signing_key(&SigningKey::generate(&mut rng))
    }

    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self {
            address: Address::from_verifying_key(&key.verifying_key()),
            secret_key: key.to_bytes().to_vec(),
        }
    }

    pub fn signing_key(&self) -> Result<SigningKey, AuthError> {
        let bytes: [u8; 32] = self
            .secret_key
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedKey)?;
        let key = SigningKey::from_bytes(&bytes);
        if Address::from_verifying_key(&key.verifying_key()) != self.address {
            return Err(AuthError::MalformedKey);
        }
        Ok(key)
    }

    /// Writes the key as JSON. Refuses to overwrite, and on unix the file is
    /// readable by its owner only.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(&serde_json::to_vec_pretty(self)?)?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(call: Call) -> CallBody {
        CallBody {
            target: Address::from_bytes([9; 20]),
            nonce: 1,
            call,
        }
    }

    #[test]
    fn signed_call_yields_signer_address() {
        let key = KeyFile::generate();
        let signing = key.signing_key().unwrap();
        let signed = body(Call::RenounceOwnership).sign(&signing);
        assert_eq!(signed.verify().unwrap(), key.address);
    }

    #[test]
    fn tampered_call_fails_verification() {
        let signing = KeyFile::generate().signing_key().unwrap();
        let mut signed = body(Call::TreasuryTransfer {
            to: Address::from_bytes([2; 20]),
            amount: 10,
        })
        .sign(&signing);
        signed.body.call = Call::TreasuryTransfer {
            to: Address::from_bytes([2; 20]),
            amount: 10_000,
        };
        assert_eq!(signed.verify(), Err(AuthError::InvalidSignature));

        let mut truncated = body(Call::RenounceOwnership).sign(&signing);
        truncated.signature.pop();
        assert_eq!(truncated.verify(), Err(AuthError::MalformedSignature));
    }

    #[test]
    fn digest_covers_target_and_nonce() {
        let a = body(Call::RenounceOwnership);
        let mut b = a.clone();
        b.nonce = 2;
        let mut c = a.clone();
        c.target = Address::from_bytes([8; 20]);
        assert_ne!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn signed_call_survives_json() {
        let signing = KeyFile::generate().signing_key().unwrap();
        let signed = body(Call::TransferOwnership {
            new_owner: Address::from_bytes([3; 20]),
        })
        .sign(&signing);
        let json = serde_json::to_string(&signed).unwrap();
        assert!(json.contains("\"type\":\"transfer_ownership\""));
        let decoded: SignedCall = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, signed);
        decoded.verify().unwrap();

        let payout = body(Call::TreasuryTransfer {
            to: Address::from_bytes([3; 20]),
            amount: 100 * crate::ledger::ONE_TOKEN,
        })
        .sign(&signing);
        let json = serde_json::to_string(&payout).unwrap();
        assert!(json.contains("\"amount\":\"100000000000000000000\""));
        let decoded: SignedCall = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.verify(), payout.verify());
    }

    #[test]
    fn receipt_digest_depends_on_signer() {
        let a = body(Call::RenounceOwnership).sign(&KeyFile::generate().signing_key().unwrap());
        let b = body(Call::RenounceOwnership).sign(&KeyFile::generate().signing_key().unwrap());
        assert_eq!(a.body.digest(), b.body.digest());
        assert_ne!(a.digest(), b.digest());
        a.verify().unwrap();
        b.verify().unwrap();
    }

    #[test]
    fn saved_key_file_loads_back_and_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caller.json");
        let key = KeyFile::generate();
        key.save(&path).unwrap();

        let loaded: KeyFile = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded, key);
        assert_eq!(
            KeyFile::generate().save(&path).unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );
    }

    #[cfg(unix)]
    #[test]
    fn saved_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caller.json");
        KeyFile::generate().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn key_file_rejects_mismatched_address() {
        let mut key = KeyFile::generate();
        key.address = Address::from_bytes([1; 20]);
        assert_eq!(key.signing_key().err(), Some(AuthError::MalformedKey));
    }
}
