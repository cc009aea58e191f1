//! Length-prefixed JSON framing.

use conduit_core::Envelope;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::TransportError;

/// Default maximum frame size (10 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Codec for one plugin connection.
///
/// Decodes frames straight into [`Envelope`]s. Encoding takes bytes that
/// were already serialized, so serialization failures surface at the call
/// site rather than inside the writer task.
#[derive(Debug)]
pub struct EnvelopeCodec {
    inner: LengthDelimitedCodec,
    max_frame_bytes: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the given frame size limit.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(max_frame_bytes)
            .new_codec();
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Configured frame size limit.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn map_io(&self, e: std::io::Error) -> TransportError {
        if e.get_ref()
            .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>())
        {
            TransportError::FrameTooLarge {
                size: 0,
                limit: self.max_frame_bytes,
            }
        } else {
            TransportError::Io(e)
        }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, TransportError> {
        let frame = match self.inner.decode(src) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.map_io(e)),
        };
        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(TransportError::Decode)
    }
}

impl Encoder<Bytes> for EnvelopeCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), TransportError> {
        if item.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size: item.len(),
                limit: self.max_frame_bytes,
            });
        }
        self.inner.encode(item, dst).map_err(|e| self.map_io(e))
    }
}
