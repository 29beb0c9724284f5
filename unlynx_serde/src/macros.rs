/// Derives string conversions via serialization to/from base64
#[macro_export]
macro_rules! derive_base64_conversions {
    ($t:ty, $e:ty) => {
        impl $crate::ToBytes for $t {
            type Error = $e;

            fn to_bytes(&self) -> ::std::result::Result<::std::vec::Vec<u8>, Self::Error> {
                let bytes = $crate::serialize(self)?;
                Ok(bytes)
            }
        }

        impl $crate::FromBytes for $t {
            type Error = $e;

            fn from_bytes(bytes: &[u8]) -> ::std::result::Result<Self, Self::Error> {
                let x = $crate::deserialize(bytes)?;
                Ok(x)
            }
        }

        impl ::std::fmt::Display for $t {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                use $crate::ToBytes;
                let bytes = self.to_bytes().map_err(|_| ::std::fmt::Error)?;
                write!(f, "{}", $crate::to_base64(&bytes))
            }
        }

        impl ::std::str::FromStr for $t {
            type Err = $e;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                use $crate::FromBytes;
                let bytes = $crate::from_base64(s)?;
                let x = Self::from_bytes(&bytes)?;
                Ok(x)
            }
        }
    };
}
