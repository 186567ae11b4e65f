//! Deterministic account derivation from seeds or raw private keys.

use std::{fmt, str::FromStr};

use alloy::{
    primitives::{Address, B256},
    signers::local::{
        MnemonicBuilder, PrivateKeySigner,
        coins_bip39::{English, Mnemonic},
    },
};
use thiserror::Error;

/// Word count of freshly generated seeds.
pub const MNEMONIC_WORDS: usize = 12;

/// Account derivation error.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Cannot derive account {index} from mnemonic: {reason}")]
    InvalidMnemonic { index: u32, reason: String },
    #[error("Invalid private key #{position}: {reason}")]
    InvalidPrivateKey { position: usize, reason: String },
    #[error("No private keys supplied and {0} is not set")]
    MissingDefaultKey(&'static str),
    #[error("Mnemonic generation failed: {0}")]
    Generation(String),
}

/// A signing account: address plus private key.
#[derive(Clone)]
pub struct Account {
    signer: PrivateKeySigner,
}

impl Account {
    #[must_use]
    pub const fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    #[must_use]
    pub fn private_key(&self) -> B256 {
        self.signer.to_bytes()
    }

    #[must_use]
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

// Keys stay out of debug output.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable list of accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountSet {
    accounts: Vec<Account>,
}

impl AccountSet {
    #[must_use]
    pub const fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Account> {
        self.accounts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(Account::address).collect()
    }

    /// Split into `(first mid accounts, remainder)`.
    #[must_use]
    pub fn split_at(&self, mid: usize) -> (Self, Self) {
        let mid = mid.min(self.accounts.len());
        let (head, tail) = self.accounts.split_at(mid);
        (Self::new(head.to_vec()), Self::new(tail.to_vec()))
    }
}

/// Derive `count` accounts starting at BIP-44 index `offset`.
///
/// Index `i` always maps to `m/44'/60'/0'/0/{i}`, so the same seed yields the
/// same addresses across restarts.
///
/// # Errors
/// Returns error if the phrase is not a valid BIP-39 mnemonic.
pub fn derive_from_mnemonic(
    mnemonic: &str,
    count: u32,
    offset: u32,
) -> Result<AccountSet, AccountError> {
    let end = offset.saturating_add(count);
    (offset..end)
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(mnemonic)
                .derivation_path(format!("m/44'/60'/0'/0/{index}"))
                .and_then(|builder| builder.build())
                .map(Account::from_signer)
                .map_err(|e| AccountError::InvalidMnemonic {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(AccountSet::new)
}

/// Owner keys first, player keys appended.
///
/// The first `owner_keys.len()` entries are the deployer accounts.
///
/// # Errors
/// Returns error if any key is not a 32-byte hex secret.
pub fn derive_from_private_keys<S: AsRef<str>>(
    owner_keys: &[S],
    player_keys: &[S],
) -> Result<AccountSet, AccountError> {
    owner_keys
        .iter()
        .chain(player_keys)
        .enumerate()
        .map(|(position, key)| parse_private_key(key.as_ref(), position))
        .collect::<Result<Vec<_>, _>>()
        .map(AccountSet::new)
}

fn parse_private_key(key: &str, position: usize) -> Result<Account, AccountError> {
    let trimmed = key.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    PrivateKeySigner::from_str(hex)
        .map(Account::from_signer)
        .map_err(|e| AccountError::InvalidPrivateKey {
            position,
            reason: e.to_string(),
        })
}

/// Generate a fresh English seed phrase.
///
/// # Errors
/// Returns error if entropy cannot be turned into a phrase.
pub fn generate_mnemonic() -> Result<String, AccountError> {
    let mut rng = rand::thread_rng();
    Mnemonic::<English>::new_with_count(&mut rng, MNEMONIC_WORDS)
        .map(|m| m.to_phrase())
        .map_err(|e| AccountError::Generation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn test_known_derivation() {
        let accounts = derive_from_mnemonic(TEST_MNEMONIC, 2, 0).unwrap();
        assert_eq!(
            accounts.addresses(),
            vec![
                address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
                address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"),
            ]
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_from_mnemonic(TEST_MNEMONIC, 1, 3).unwrap();
        let second = derive_from_mnemonic(TEST_MNEMONIC, 1, 3).unwrap();
        assert_eq!(first.addresses(), second.addresses());
    }

    #[test]
    fn test_offset_keeps_ascending_order() {
        let all = derive_from_mnemonic(TEST_MNEMONIC, 4, 0).unwrap();
        let tail = derive_from_mnemonic(TEST_MNEMONIC, 2, 2).unwrap();
        assert_eq!(tail.addresses(), all.addresses()[2..].to_vec());
    }

    #[test]
    fn test_invalid_mnemonic() {
        let err = derive_from_mnemonic("not a real seed phrase", 1, 0).unwrap_err();
        assert!(matches!(err, AccountError::InvalidMnemonic { index: 0, .. }));
    }

    #[test]
    fn test_private_keys_owners_first() {
        let owners = vec![KEY_1.to_string()];
        let players = vec![KEY_0.to_string()];
        let accounts = derive_from_private_keys(&owners, &players).unwrap();

        assert_eq!(accounts.len(), 2);
        let (deployers, player_accounts) = accounts.split_at(owners.len());
        assert_eq!(
            deployers.addresses(),
            vec![address!("70997970C51812dc3A010C7d01b50e0d17dc79C8")]
        );
        assert_eq!(
            player_accounts.addresses(),
            vec![address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")]
        );
    }

    #[test]
    fn test_private_key_matches_seed_account() {
        let from_seed = derive_from_mnemonic(TEST_MNEMONIC, 1, 0).unwrap();
        let from_key = derive_from_private_keys(&[KEY_0], &[]).unwrap();
        assert_eq!(from_seed.addresses(), from_key.addresses());
        assert_eq!(
            from_key.get(0).unwrap().private_key(),
            from_seed.get(0).unwrap().private_key()
        );
    }

    #[test]
    fn test_bad_private_key_reports_position() {
        let err = derive_from_private_keys(&[KEY_0, "zz"], &[]).unwrap_err();
        assert!(matches!(err, AccountError::InvalidPrivateKey { position: 1, .. }));
    }

    #[test]
    fn test_generated_mnemonic_is_usable() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), MNEMONIC_WORDS);
        assert_eq!(derive_from_mnemonic(&phrase, 3, 0).unwrap().len(), 3);
        assert_ne!(phrase, generate_mnemonic().unwrap());
    }

    #[test]
    fn test_debug_hides_key() {
        let accounts = derive_from_private_keys(&[KEY_0], &[]).unwrap();
        let debug = format!("{:?}", accounts.get(0).unwrap());
        assert!(!debug.contains("ac0974bec"));
    }
}
