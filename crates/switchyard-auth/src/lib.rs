//! Credential validation
//!
//! Resolves a bearer credential to the [`switchyard_core::SubscriptionContext`]
//! the broker routes with, through a [`SubscriptionDirectory`] and the plan
//! catalog. Successful resolutions are cached in the shared store.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod directory;
mod error;
mod plans;
mod validator;

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

pub use directory::{
    CredentialRecord, HttpDirectory, StaticDirectory, SubscriptionDirectory, build_directory,
};
pub use error::AuthError;
pub use plans::PlanCatalog;
pub use validator::AuthValidator;

/// Lowercase hex SHA-256 of a raw credential
///
/// Raw credentials never leave this process; directories and caches only
/// ever see the hash.
pub fn credential_hash(raw: &str) -> String {
    Sha256::digest(raw.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        assert_eq!(
            credential_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
