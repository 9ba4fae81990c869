use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Errors from parsing an object id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectIdError {
    #[error("object id must be 24 hex characters, got {0} bytes")]
    InvalidLength(usize),
    #[error("object id contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// 12-byte document identifier, rendered as 24 lowercase hex characters.
///
/// Layout: 4-byte big-endian unix seconds, 5 bytes of per-process randomness,
/// 3-byte big-endian counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

const COUNTER_MASK: u32 = 0x00ff_ffff;

fn process_unique() -> &'static [u8; 5] {
    static UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
    UNIQUE.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let bytes = random.as_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
    })
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let b = random.as_bytes();
        AtomicU32::new(u32::from_be_bytes([0, b[10], b[11], b[12]]))
    })
}

impl ObjectId {
    /// Generate a fresh id
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let count = counter().fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        Self::from_parts(seconds, *process_unique(), count)
    }

    fn from_parts(seconds: u32, unique: [u8; 5], count: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&unique);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parse the 24-character lowercase hex form
    pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
        if s.len() != 24 {
            return Err(ObjectIdError::InvalidLength(s.len()));
        }

        let mut bytes = [0u8; 12];
        let mut nibbles = s.chars().map(|c| match c {
            '0'..='9' => Ok(c as u8 - b'0'),
            'a'..='f' => Ok(c as u8 - b'a' + 10),
            other => Err(ObjectIdError::InvalidCharacter(other)),
        });

        for byte in bytes.iter_mut() {
            // Length was checked above, so both nibbles are present
            let high = nibbles.next().unwrap_or(Ok(0))?;
            let low = nibbles.next().unwrap_or(Ok(0))?;
            *byte = (high << 4) | low;
        }

        Ok(Self(bytes))
    }

    /// Creation time embedded in the id (second precision)
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(seconds as i64, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_24_lowercase_hex() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(ObjectId::parse_str(&hex).unwrap(), id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<ObjectId> = (0..10_000).map(|_| ObjectId::new()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn embeds_creation_time() {
        let before = Utc::now().timestamp();
        let id = ObjectId::new();
        let after = Utc::now().timestamp();
        let ts = id.timestamp().timestamp();
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn counter_occupies_last_three_bytes() {
        let id = ObjectId::from_parts(1, [0xaa; 5], 0x0102_0304);
        assert_eq!(id.to_hex(), "00000001aaaaaaaaaa020304");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(ObjectId::parse_str("abc"), Err(ObjectIdError::InvalidLength(3)));
        assert_eq!(
            ObjectId::parse_str("5a1b2c3d4e5f60718293a4bZ"),
            Err(ObjectIdError::InvalidCharacter('Z'))
        );
        // Length is counted in bytes
        assert_eq!(ObjectId::parse_str("é"), Err(ObjectIdError::InvalidLength(2)));
        assert_eq!(
            ObjectId::parse_str("éééééééééééé"),
            Err(ObjectIdError::InvalidCharacter('é'))
        );
        // Uppercase hex does not match the route constraint
        assert!(ObjectId::parse_str("5A1B2C3D4E5F60718293A4B5").is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let id = ObjectId::parse_str("5a1b2c3d4e5f60718293a4b5").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"5a1b2c3d4e5f60718293a4b5\"");
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ObjectId>("\"nope\"").is_err());
    }
}
