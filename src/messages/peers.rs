use tracing::debug;

use super::reader::{require_min, PayloadReader};
use crate::error::DecodeError;

/// PEERS_V2: i32 count, then one-byte-length-prefixed `host:port` strings.
///
/// Decoding stops at the first truncated entry and keeps what was read before
/// it, so an overstated count is harmless. Entry bytes are decoded lossily;
/// entries without a port separator are skipped.
pub fn decode_peers_v2(payload: &[u8]) -> Result<Vec<String>, DecodeError> {
    require_min("PEERS_V2", payload, 4)?;
    let mut r = PayloadReader::new(payload);
    let count = usize::try_from(r.read_i32()?).unwrap_or(0);

    let mut peers = Vec::with_capacity(count.min(r.remaining()));
    for index in 0..count {
        let Ok(len) = r.read_u8() else {
            break;
        };
        let Ok(raw) = r.take(len as usize) else {
            debug!(index, len, remaining = r.remaining(), "Peer list truncated");
            break;
        };
        let address = String::from_utf8_lossy(raw);
        if address.contains(':') {
            peers.push(address.into_owned());
        } else {
            debug!(%address, "Skipping peer entry without port");
        }
    }
    Ok(peers)
}
