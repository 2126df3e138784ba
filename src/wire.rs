//! Reply payload framing: a tagged container of publication records.
//!
//! A sync reply carries one top-level element with tag
//! [`PUBLICATION_BLOCK_TAG`] whose body is a concatenation of framed
//! publication elements. Parsers reject an unknown outer tag and skip
//! unknown inner tags rather than failing the whole reply.
//!
//! Frame layout, inner and outer alike:
//!
//! ```text
//! ┌────────┬───────────────┬──────────┐
//! │  TAG   │    LENGTH     │   BODY   │
//! │ 1 byte │ 4 bytes (LE)  │ n bytes  │
//! └────────┴───────────────┴──────────┘
//! ```

use tracing::warn;

use crate::error::{PubsyncError, Result};
use crate::name::Name;
use crate::publication::{Publication, Validator};

/// Tag of the top-level publication block in a reply payload.
pub const PUBLICATION_BLOCK_TAG: u8 = 129;

/// Tag of a single publication element inside the block.
pub const PUBLICATION_TAG: u8 = 6;

/// Frame header size: tag byte plus 32-bit length.
const HEADER_BYTES: usize = 5;

/// Incrementally packs publications into one reply payload, stopping at a
/// byte budget.
///
/// # Example
///
/// ```rust
/// use pubsync::wire::PayloadBuilder;
/// use pubsync::{Name, Publication};
///
/// let publication = Publication::new(Name::from("/a").appended_timestamp(1), vec![0; 16]);
/// let mut builder = PayloadBuilder::new(1300);
/// assert!(builder.push(&publication).unwrap());
/// let payload = builder.finish();
/// assert_eq!(payload[0], pubsync::wire::PUBLICATION_BLOCK_TAG);
/// ```
#[derive(Debug)]
pub struct PayloadBuilder {
    buf: Vec<u8>,
    budget: usize,
    count: usize,
}

impl PayloadBuilder {
    /// Start a payload capped at `budget` bytes, framing included.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        let mut buf = Vec::with_capacity(budget.min(4096));
        buf.push(PUBLICATION_BLOCK_TAG);
        buf.extend_from_slice(&[0; 4]);
        Self {
            buf,
            budget,
            count: 0,
        }
    }

    /// Append a publication if it fits within the budget.
    ///
    /// Returns `Ok(false)` without modifying the payload when adding the
    /// publication would exceed the budget.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the publication cannot be encoded.
    pub fn push(&mut self, publication: &Publication) -> Result<bool> {
        let wire = publication.to_wire()?;
        if self.buf.len() + HEADER_BYTES + wire.len() > self.budget {
            return Ok(false);
        }
        self.buf.push(PUBLICATION_TAG);
        #[allow(clippy::cast_possible_truncation)]
        self.buf.extend_from_slice(&(wire.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(&wire);
        self.count += 1;
        Ok(true)
    }

    /// Number of publications packed so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Check whether no publication has been packed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finalize the container framing and return the payload bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let body_len = (self.buf.len() - HEADER_BYTES) as u32;
        self.buf[1..HEADER_BYTES].copy_from_slice(&body_len.to_le_bytes());
        self.buf
    }
}

/// Parse a reply payload into its publication records.
///
/// Inner elements with an unknown tag or an undecodable body are skipped
/// with a warning; siblings still parse.
///
/// # Errors
///
/// Returns `BadPayloadTag` if the outer element is not the publication
/// block, or `Codec` if the framing is truncated.
pub fn parse_payload(payload: &[u8]) -> Result<Vec<Publication>> {
    let (tag, body) = split_frame(payload)?;
    if tag != PUBLICATION_BLOCK_TAG {
        return Err(PubsyncError::BadPayloadTag { tag });
    }

    let mut publications = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let (tag, element) = split_frame(rest)?;
        rest = &rest[HEADER_BYTES + element.len()..];

        if tag != PUBLICATION_TAG {
            warn!(tag, "skipping unknown element in publication block");
            continue;
        }
        match Publication::from_wire(element) {
            Ok(publication) => publications.push(publication),
            Err(e) => warn!("skipping undecodable publication: {e}"),
        }
    }
    Ok(publications)
}

fn split_frame(bytes: &[u8]) -> Result<(u8, &[u8])> {
    if bytes.len() < HEADER_BYTES {
        return Err(PubsyncError::Codec("truncated frame header".to_string()));
    }
    let tag = bytes[0];
    let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let body = bytes
        .get(HEADER_BYTES..HEADER_BYTES + len)
        .ok_or_else(|| PubsyncError::Codec("truncated frame body".to_string()))?;
    Ok((tag, body))
}

/// Validator that re-checks each packed publication's checksum signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumValidator;

impl Validator for ChecksumValidator {
    fn validate(&self, _reply_name: &Name, payload: &[u8]) -> bool {
        match parse_payload(payload) {
            Ok(publications) => publications.iter().all(Publication::verify_checksum),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{Blake3Signer, Signer};

    fn signed(path: &str, ts: u64, content: &[u8]) -> Publication {
        let mut publication =
            Publication::new(Name::from(path).appended_timestamp(ts), content.to_vec());
        Blake3Signer.sign(&mut publication);
        publication
    }

    #[test]
    fn roundtrip_multiple_publications() {
        let pubs = [
            signed("/a", 1, b"one"),
            signed("/b", 2, b"two"),
            signed("/c", 3, b"three"),
        ];
        let mut builder = PayloadBuilder::new(4096);
        for publication in &pubs {
            assert!(builder.push(publication).unwrap());
        }
        assert_eq!(builder.count(), 3);

        let parsed = parse_payload(&builder.finish()).unwrap();
        assert_eq!(parsed, pubs);
    }

    #[test]
    fn empty_block_roundtrip() {
        let builder = PayloadBuilder::new(64);
        assert!(builder.is_empty());
        let parsed = parse_payload(&builder.finish()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn budget_stops_packing() {
        let first = signed("/a", 1, &[0u8; 64]);
        let second = signed("/b", 2, &[0u8; 64]);
        let one_size = first.to_wire().unwrap().len();

        // Room for exactly one element.
        let budget = HEADER_BYTES + HEADER_BYTES + one_size;
        let mut builder = PayloadBuilder::new(budget);
        assert!(builder.push(&first).unwrap());
        assert!(!builder.push(&second).unwrap());
        assert_eq!(builder.count(), 1);

        let parsed = parse_payload(&builder.finish()).unwrap();
        assert_eq!(parsed, [first]);
    }

    #[test]
    fn rejects_unknown_outer_tag() {
        let mut payload = vec![42u8];
        payload.extend_from_slice(&0u32.to_le_bytes());
        let err = parse_payload(&payload).unwrap_err();
        assert!(matches!(err, PubsyncError::BadPayloadTag { tag: 42 }));
    }

    #[test]
    fn skips_unknown_inner_tag() {
        let keeper = signed("/keep", 9, b"kept");
        let keeper_wire = keeper.to_wire().unwrap();

        let mut body = Vec::new();
        body.push(99u8);
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(&[1, 2, 3]);
        body.push(PUBLICATION_TAG);
        #[allow(clippy::cast_possible_truncation)]
        body.extend_from_slice(&(keeper_wire.len() as u32).to_le_bytes());
        body.extend_from_slice(&keeper_wire);

        let mut payload = vec![PUBLICATION_BLOCK_TAG];
        #[allow(clippy::cast_possible_truncation)]
        payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
        payload.extend_from_slice(&body);

        let parsed = parse_payload(&payload).unwrap();
        assert_eq!(parsed, [keeper]);
    }

    #[test]
    fn skips_undecodable_publication() {
        let mut body = Vec::new();
        body.push(PUBLICATION_TAG);
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&[0xff, 0xff]);

        let mut payload = vec![PUBLICATION_BLOCK_TAG];
        #[allow(clippy::cast_possible_truncation)]
        payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
        payload.extend_from_slice(&body);

        let parsed = parse_payload(&payload).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn rejects_truncated_frames() {
        assert!(parse_payload(&[PUBLICATION_BLOCK_TAG, 1]).is_err());

        let mut payload = vec![PUBLICATION_BLOCK_TAG];
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.push(0);
        assert!(parse_payload(&payload).is_err());
    }

    #[test]
    fn checksum_validator() {
        let good = signed("/ok", 5, b"fine");
        let mut builder = PayloadBuilder::new(4096);
        builder.push(&good).unwrap();
        let payload = builder.finish();
        assert!(ChecksumValidator.validate(&Name::from("/any"), &payload));

        let unsigned = Publication::new(Name::from("/bad").appended_timestamp(6), b"x".to_vec());
        let mut builder = PayloadBuilder::new(4096);
        builder.push(&unsigned).unwrap();
        let payload = builder.finish();
        assert!(!ChecksumValidator.validate(&Name::from("/any"), &payload));
    }
}
