//! Shard and root identifiers over CIDv1.
//!
//! A shard is one CAR file; its identity is a CIDv1 with the CAR multicodec
//! (`0x0202`) whose multihash is SHA2-256 over the stored bytes. A root link
//! names the logical DAG root whose serialization is sharded — any codec,
//! normalized to CIDv1 so the destination key layout is stable.
//!
//! ## String form
//!
//! The canonical string representation is **base32-lower** (multibase),
//! producing the familiar `bag...` / `bafy...` prefixes. This is what
//! appears in JSON, logs, and object keys.

use crate::error::{Error, Result};
use cid::Cid;
use multihash::Multihash;
use std::fmt;
use std::str::FromStr;

/// Multicodec for CAR archives (standard).
pub const CAR_CODEC: u64 = 0x0202;

/// SHA2-256 multihash code (standard).
pub const SHA2_256: u64 = 0x12;

/// Identity of one CAR shard: CIDv1, CAR codec, SHA2-256 multihash of the
/// shard bytes.
///
/// Construction validates the codec, so holding a `ShardId` is proof the
/// identifier is CAR-shaped. The multihash is *asserted* by the caller; the
/// copy path verifies it against the streamed bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardId(Cid);

impl ShardId {
    /// Build a shard identity from a raw SHA2-256 digest.
    pub fn from_sha256_digest(digest: &[u8; 32]) -> Self {
        // SHA2-256 produces 32 bytes, MH_SIZE=64 — wrap always succeeds.
        let mh =
            Multihash::<64>::wrap(SHA2_256, digest).expect("SHA2-256 digest fits in Multihash<64>");
        Self(Cid::new_v1(CAR_CODEC, mh))
    }

    /// Wrap an existing `Cid`, rejecting non-CAR codecs and non-SHA2-256
    /// multihashes.
    pub fn from_cid(cid: Cid) -> Result<Self> {
        if cid.codec() != CAR_CODEC {
            return Err(Error::invalid_cid(format!(
                "expected CAR codec 0x{CAR_CODEC:04x}, got 0x{:04x}",
                cid.codec()
            )));
        }
        if cid.hash().code() != SHA2_256 {
            return Err(Error::invalid_cid(format!(
                "expected SHA2-256 multihash, got code 0x{:02x}",
                cid.hash().code()
            )));
        }
        Ok(Self(cid))
    }

    /// Borrow the inner `Cid`.
    pub fn as_cid(&self) -> &Cid {
        &self.0
    }

    /// The shard's multihash.
    pub fn multihash(&self) -> &Multihash<64> {
        self.0.hash()
    }

    /// The raw SHA2-256 digest (32 bytes).
    pub fn digest(&self) -> &[u8] {
        self.0.hash().digest()
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // CIDv1 Display uses base32-lower by default.
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl FromStr for ShardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cid = Cid::try_from(s).map_err(|e| Error::invalid_cid(format!("{s}: {e}")))?;
        Self::from_cid(cid)
    }
}

impl serde::Serialize for ShardId {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0.to_bytes())
        }
    }
}

impl<'de> serde::Deserialize<'de> for ShardId {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            ShardId::from_str(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let cid = Cid::try_from(bytes.as_slice())
                .map_err(|e| serde::de::Error::custom(format!("invalid cid bytes: {e}")))?;
            ShardId::from_cid(cid).map_err(serde::de::Error::custom)
        }
    }
}

/// The DAG root a shard belongs to. Any codec; always normalized to CIDv1.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootLink(Cid);

impl RootLink {
    /// Wrap a `Cid`, re-encoding CIDv0 as CIDv1 so the string form (and
    /// therefore the link-marker key) is version-independent.
    pub fn from_cid(cid: Cid) -> Self {
        match cid.version() {
            cid::Version::V1 => Self(cid),
            _ => Self(Cid::new_v1(cid.codec(), *cid.hash())),
        }
    }

    /// Borrow the inner `Cid`.
    pub fn as_cid(&self) -> &Cid {
        &self.0
    }
}

impl fmt::Display for RootLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RootLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootLink({})", self.0)
    }
}

impl FromStr for RootLink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cid = Cid::try_from(s).map_err(|e| Error::invalid_cid(format!("{s}: {e}")))?;
        Ok(Self::from_cid(cid))
    }
}

/// Base58btc encoding of a multihash's bytes — the block-index table's
/// partition key form.
pub fn multihash_base58(mh: &Multihash<64>) -> String {
    bs58::encode(mh.to_bytes()).into_string()
}
