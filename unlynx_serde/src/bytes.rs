//! Serialization/deserialization

use serde::{de::Deserialize, ser::Serialize};

/// A trait for types that can be serialized to bytes
pub trait ToBytes {
    /// Error type
    type Error;

    /// Serializes to bytes
    fn to_bytes(&self) -> Result<Vec<u8>, Self::Error>;
}

/// A trait for types that can be deserialized from bytes
pub trait FromBytes: Sized {
    /// Error type
    type Error;

    /// Deserializes from bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error>;
}

/// Serializes any value with the workspace byte encoding
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> crate::Result<Vec<u8>> {
    let bytes = bincode::config().big_endian().serialize(value)?;
    Ok(bytes)
}

/// Deserializes any value with the workspace byte encoding
pub fn deserialize<T>(bytes: &[u8]) -> crate::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let x = bincode::config().big_endian().deserialize(bytes)?;
    Ok(x)
}

impl<T> ToBytes for Vec<T>
where
    T: Serialize,
{
    type Error = crate::Error;

    fn to_bytes(&self) -> Result<Vec<u8>, Self::Error> {
        serialize(self)
    }
}

impl<T> FromBytes for Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    type Error = crate::Error;

    fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
        deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{FromBytes, ToBytes};

    #[test]
    fn vectors_use_big_endian_lengths() {
        let v = vec![1u16, 2, 3];
        let bytes = v.to_bytes().unwrap();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&bytes[8..], &[0, 1, 0, 2, 0, 3]);
        let back = Vec::<u16>::from_bytes(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = vec![7u32, 8].to_bytes().unwrap();
        let r = Vec::<u32>::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(r.is_err());
    }
}
