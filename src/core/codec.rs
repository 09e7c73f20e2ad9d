use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::core::frame::{parse, partial_magic_tail, resync_offset, Frame, Parsed};
use crate::error::{ProtocolError, Result};
use crate::utils::metrics::Metrics;

/// Tokio codec draining a receive buffer frame by frame.
///
/// Each `decode` call loops resync → parse → consume until a frame is produced
/// or the buffer holds no complete frame, so a single read carrying several
/// frames (or a discard followed by a valid frame) is fully consumed. When no
/// magic token is buffered, a trailing partial token is held back for the next
/// read instead of being dropped with the garbage.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec {
    metrics: Option<Arc<Metrics>>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count discards and received frames in `metrics`
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            let mut skip = resync_offset(src);
            if skip == src.len() {
                skip -= partial_magic_tail(src);
            }
            if skip > 0 {
                debug!(bytes = skip, "Dropping bytes before magic token");
                src.advance(skip);
            }

            match parse(src)? {
                Parsed::Insufficient => return Ok(None),
                Parsed::Discard(count) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.frame_discarded();
                    }
                    src.advance(count.min(src.len()));
                }
                Parsed::Frame {
                    frame,
                    total_length,
                } => {
                    src.advance(total_length);
                    if let Some(metrics) = &self.metrics {
                        metrics.message_received(total_length as u64);
                    }
                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst);
        Ok(())
    }
}
