use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheContents, CacheError};

/// De/serializes values to the byte strings stored in the remote tier.
///
/// The core treats the codec as opaque; compression or alternative formats
/// can be plugged in by implementing this trait.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a value for storage.
    fn marshal<T: Serialize>(&self, value: &T) -> CacheContents<Vec<u8>>;

    /// Decodes a stored payload.
    ///
    /// An empty payload is the "absent" sentinel and decodes to
    /// [`CacheError::NotFound`].
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheContents<T>;
}

/// The default JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal<T: Serialize>(&self, value: &T) -> CacheContents<Vec<u8>> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Marshalling(e.to_string()))?;
        // A value encoding to `null` would be indistinguishable from an
        // absent entry on the way back out, refuse it up front.
        if bytes == b"null" {
            return Err(CacheError::Marshalling(
                "refusing to marshal a null value".into(),
            ));
        }
        Ok(bytes)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheContents<T> {
        if bytes.is_empty() {
            return Err(CacheError::NotFound);
        }
        serde_json::from_slice(bytes).map_err(|e| CacheError::Marshalling(e.to_string()))
    }
}
