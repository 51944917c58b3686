use serde::Serialize;
use types::primitives::H256;

/// Recoverable ECDSA signature of a guardian attestation.
///
/// Serialized into bus payloads as `{ r, s, v }`; submitted on chain in the
/// compact two-word form with the recovery bit folded into `s`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct GuardianSignature {
    pub r: H256,
    pub s: H256,
    pub v: u64,
}

impl GuardianSignature {
    /// `(r, vs)` with the recovery bit in the top bit of `vs`.
    #[must_use]
    pub fn compact(&self) -> (H256, H256) {
        let mut vs = self.s;

        if self.v % 2 == 0 {
            vs.0[0] |= 0x80;
        }

        (self.r, vs)
    }
}
