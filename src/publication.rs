//! Signed publication records and the signing/validation seams.
//!
//! A publication is an immutable named record whose name ends in a
//! monotonic timestamp appended by the publisher before signing. Inside the
//! engine a publication is identified by a 32-bit fingerprint of its signed
//! wire form.

use serde::{Deserialize, Serialize};

use crate::error::{PubsyncError, Result};
use crate::hash::{murmur3_32, CHECK_SEED};
use crate::name::Name;

/// An immutable, signed, named record with an embedded monotonic timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    name: Name,
    content: Vec<u8>,
    signature: [u8; 32],
}

impl Publication {
    /// Create an unsigned publication. The caller appends the timestamp
    /// component to `name` before handing the publication to the engine.
    #[must_use]
    pub fn new(name: Name, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            content: content.into(),
            signature: [0; 32],
        }
    }

    /// The publication's name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The publication's content bytes.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8; 32] {
        &self.signature
    }

    /// Install a signature. Called by [`Signer`] implementations.
    pub fn set_signature(&mut self, signature: [u8; 32]) {
        self.signature = signature;
    }

    /// The embedded timestamp (final name component), if present.
    #[must_use]
    pub fn timestamp(&self) -> Option<u64> {
        self.name.timestamp()
    }

    /// Digest of the signed portion: every name component plus the content,
    /// each length-prefixed so field boundaries cannot be confused.
    #[must_use]
    pub fn checksum_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for component in self.name.components() {
            hasher.update(&(component.len() as u64).to_le_bytes());
            hasher.update(component.as_bytes());
        }
        hasher.update(&(self.content.len() as u64).to_le_bytes());
        hasher.update(&self.content);
        *hasher.finalize().as_bytes()
    }

    /// Check the signature against the checksum digest.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.signature == self.checksum_digest()
    }

    /// Encode the signed wire form.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if serialization fails.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| PubsyncError::Codec(format!("publication encode: {e}")))
    }

    /// Decode a publication from its wire form.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if deserialization fails.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| PubsyncError::Codec(format!("publication decode: {e}")))
    }

    /// 32-bit content fingerprint of the signed wire form: the IBLT key
    /// under which this publication is advertised.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the wire form cannot be produced.
    pub fn fingerprint(&self) -> Result<u32> {
        Ok(murmur3_32(CHECK_SEED, &self.to_wire()?))
    }
}

/// Signs publications as they are published.
pub trait Signer: Send {
    /// Install a signature on `publication`.
    fn sign(&self, publication: &mut Publication);
}

/// Validates incoming sync replies before their contents are examined.
pub trait Validator: Send {
    /// Return `true` if the reply named `reply_name` with `payload` should
    /// be processed.
    fn validate(&self, reply_name: &Name, payload: &[u8]) -> bool;
}

/// Default signer: a BLAKE3 checksum over the name and content. A high
/// quality checksum without provenance or trust semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Signer;

impl Signer for Blake3Signer {
    fn sign(&self, publication: &mut Publication) {
        let digest = publication.checksum_digest();
        publication.set_signature(digest);
    }
}

/// Default validator: accepts every reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _reply_name: &Name, _payload: &[u8]) -> bool {
        true
    }
}
