// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Keypairs and single-signer certificates over a 32-byte block hash.
//!
//! A block is signed by exactly one proposer; there is no threshold or
//! quorum certificate here (see the discussion of the dead `qc` path in
//! `libe2c`'s design notes — this crate implements the single-signer
//! variant only).

use base64::engine::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::{alphabet, Engine};
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use libsecp256k1::{PublicKey, RecoveryId, Signature};

const B64_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as Base64, for use in settings files and key exports.
pub fn to_b64(bz: &[u8]) -> String {
    B64_ENGINE.encode(bz)
}

/// Decode bytes from Base64.
pub fn from_b64(b64: &str) -> anyhow::Result<Vec<u8>> {
    Ok(B64_ENGINE.decode(b64)?)
}

/// Wrapper around a [`libsecp256k1::SecretKey`] that zeroizes on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(libsecp256k1::SecretKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl SecretKey {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self(libsecp256k1::SecretKey::random(rng))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&self.0)
    }

    pub fn serialize(&self) -> Zeroizing<[u8; libsecp256k1::util::SECRET_KEY_SIZE]> {
        Zeroizing::new(self.0.serialize())
    }

    /// Sign a 32-byte digest, producing a [`PartCert`] — a "partial
    /// certificate" in the sense of being one replica's signature, as
    /// opposed to a quorum certificate aggregating many.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> PartCert {
        let (sig, rec) = libsecp256k1::sign(&libsecp256k1::Message::parse(digest), &self.0);
        PartCert {
            signature: sig,
            recovery_id: rec,
        }
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        let mut sk = libsecp256k1::SecretKey::default();
        std::mem::swap(&mut self.0, &mut sk);
        let mut sk: libsecp256k1::curve::Scalar = sk.into();
        sk.0.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize()
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl TryFrom<Vec<u8>> for SecretKey {
    type Error = libsecp256k1::Error;

    fn try_from(mut value: Vec<u8>) -> Result<Self, Self::Error> {
        let sk = libsecp256k1::SecretKey::parse_slice(&value)?;
        value.zeroize();
        Ok(Self(sk))
    }
}

impl From<&SecretKey> for PublicKey {
    fn from(value: &SecretKey) -> Self {
        value.public_key()
    }
}

/// A single-proposer signature over a block hash.
///
/// Wire form is the compact 64-byte signature plus a 1-byte recovery id,
/// matching the `Signature` field that trails a `Block` in a `Propose`
/// message (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartCert {
    pub signature: Signature,
    pub recovery_id: RecoveryId,
}

impl PartCert {
    pub fn to_bytes(self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&self.signature.serialize());
        out[64] = self.recovery_id.serialize();
        out
    }

    pub fn from_bytes(bz: &[u8; 65]) -> anyhow::Result<Self> {
        let signature = Signature::parse_standard_slice(&bz[..64])
            .map_err(|e| anyhow::anyhow!("invalid signature bytes: {e}"))?;
        let recovery_id = RecoveryId::parse(bz[64])
            .map_err(|e| anyhow::anyhow!("invalid recovery id: {e}"))?;
        Ok(Self {
            signature,
            recovery_id,
        })
    }
}

/// Create a partial certificate over a block hash (spec §4.2).
pub fn create_part_cert(sk: &SecretKey, blk_hash: &[u8; 32]) -> PartCert {
    sk.sign_digest(blk_hash)
}

/// Verify a partial certificate against a proposer's public key.
pub fn verify(cert: &PartCert, blk_hash: &[u8; 32], pubkey: &PublicKey) -> bool {
    libsecp256k1::verify(
        &libsecp256k1::Message::parse(blk_hash),
        &cert.signature,
        pubkey,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn sign_and_verify_roundtrip() {
        let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
        let sk = SecretKey::random(&mut rng);
        let pk = sk.public_key();

        let digest = [42u8; 32];
        let cert = create_part_cert(&sk, &digest);
        assert!(verify(&cert, &digest, &pk));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
        let sk = SecretKey::random(&mut rng);
        let other_sk = SecretKey::random(&mut rng);

        let digest = [9u8; 32];
        let cert = create_part_cert(&sk, &digest);
        assert!(!verify(&cert, &digest, &other_sk.public_key()));
    }

    #[test]
    fn verify_rejects_tampered_digest() {
        let mut rng = ChaCha20Rng::from_seed([3u8; 32]);
        let sk = SecretKey::random(&mut rng);
        let cert = create_part_cert(&sk, &[1u8; 32]);
        assert!(!verify(&cert, &[2u8; 32], &sk.public_key()));
    }

    #[test]
    fn cert_bytes_roundtrip() {
        let mut rng = ChaCha20Rng::from_seed([5u8; 32]);
        let sk = SecretKey::random(&mut rng);
        let cert = create_part_cert(&sk, &[8u8; 32]);
        let bz = cert.to_bytes();
        let back = PartCert::from_bytes(&bz).unwrap();
        assert_eq!(cert, back);
    }
}
