//! Serde-backed codecs for the typed bridge

use bincode::Options;
use netchan_ports::{Codec, CodecError, CodecResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::type_name;
use std::marker::PhantomData;

/// Compact binary encoding, the default for channel payloads
///
/// Not self-describing: a message must decode to exactly one `T` with no
/// bytes left over, so a value of another type fails instead of decoding as
/// a prefix. Use `JsonCodec` when the payload has to explain itself.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        bincode_options().serialize(value).map_err(|e| CodecError::Encode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        bincode_options().deserialize(bytes).map_err(|e| CodecError::Decode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "bincode"
    }
}

/// Fixed-width integers like `bincode::serialize`, but trailing bytes are an error
fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Self-describing JSON encoding, handy when a channel is read by other tools
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "json"
    }
}
