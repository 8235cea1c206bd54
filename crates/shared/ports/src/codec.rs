use crate::error::CodecResult;

/// Port for turning typed values into raw channel messages and back
///
/// The transport carries no type metadata, so a codec alone decides how a
/// value is laid out. Any type can be carried by providing a `Codec` for it;
/// serde types get one for free from the transport crate.
pub trait Codec<T>: Send + Sync {
    /// Encode one value into one raw message
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decode one raw message into one value
    fn decode(&self, bytes: &[u8]) -> CodecResult<T>;

    /// Codec name for logging
    fn name(&self) -> &str {
        "Codec"
    }
}
