use anyhow::Result;
use thiserror::Error;
use types::primitives::{Address, H256};
use web3::signing::{Key as _, SecretKey, SecretKeyRef};

use crate::signature::GuardianSignature;

#[derive(Debug, Error)]
enum Error {
    #[error("wallet private key is not a valid secp256k1 scalar")]
    InvalidPrivateKey,
    #[error("digest signing failed")]
    SigningFailed,
}

/// The guardian's ECDSA identity.
///
/// The key is loaded once at startup and never sent to an RPC node; every
/// signature is produced locally over a 32-byte digest.
#[derive(Debug)]
pub struct Wallet {
    secret_key: SecretKey,
    address: Address,
}

impl Wallet {
    pub fn from_private_key(bytes: H256) -> Result<Self> {
        let secret_key =
            SecretKey::from_slice(bytes.as_bytes()).map_err(|_| Error::InvalidPrivateKey)?;

        let address = SecretKeyRef::new(&secret_key).address();

        Ok(Self {
            secret_key,
            address,
        })
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub const fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Signs a 32-byte digest, yielding `v` in `{27, 28}`.
    pub fn sign_digest(&self, digest: H256) -> Result<GuardianSignature> {
        let signature = SecretKeyRef::new(&self.secret_key)
            .sign(digest.as_bytes(), None)
            .map_err(|_| Error::SigningFailed)?;

        Ok(GuardianSignature {
            r: signature.r,
            s: signature.s,
            v: signature.v,
        })
    }
}
