// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::MAX_MESSAGE_SIZE;

/// Metadata frame that precedes each binary chunk of a large artifact
/// (e.g. a MikroTik binary backup) streamed over the control plane.
///
/// Sent as a text `Envelope` of type `event` whose payload is this struct;
/// the raw bytes follow immediately as a WebSocket binary frame. `seq` is
/// monotonic starting at 0; the terminal chunk carries `eof: true` and no
/// bytes of its own follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub correlation_id: String,
    pub seq: u64,
    #[serde(default)]
    pub eof: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<usize>,
}

impl ChunkMeta {
    pub fn data(correlation_id: impl Into<String>, seq: u64, len: usize) -> Self {
        Self { correlation_id: correlation_id.into(), seq, eof: false, len: Some(len) }
    }

    pub fn terminal(correlation_id: impl Into<String>, seq: u64) -> Self {
        Self { correlation_id: correlation_id.into(), seq, eof: true, len: None }
    }
}

/// Split a byte buffer into chunk metadata + payload pairs no larger than
/// [`MAX_MESSAGE_SIZE`] each, terminated by an `eof` marker.
pub fn plan_chunks(correlation_id: &str, bytes: &[u8]) -> Vec<(ChunkMeta, &[u8])> {
    let mut out = Vec::new();
    let mut seq = 0u64;
    for window in bytes.chunks(MAX_MESSAGE_SIZE) {
        out.push((ChunkMeta::data(correlation_id, seq, window.len()), window));
        seq += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_chunks_within_size_limit() {
        let bytes = vec![7u8; MAX_MESSAGE_SIZE * 2 + 10];
        let chunks = plan_chunks("corr-1", &bytes);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].0.seq, 0);
        assert_eq!(chunks[2].0.seq, 2);
        assert_eq!(chunks.iter().map(|(_, b)| b.len()).sum::<usize>(), bytes.len());
    }

    #[test]
    fn empty_buffer_yields_no_chunks() {
        assert!(plan_chunks("corr-1", &[]).is_empty());
    }

    proptest::proptest! {
        /// Whatever size artifact gets planned, the chunks reassemble to the
        /// exact original bytes in seq order, and no chunk exceeds the wire
        /// size limit — the invariant `rpc.request`/`agent.backup` relies on
        /// to hand a binary artifact back over a frame-size-bounded socket.
        #[test]
        fn plan_chunks_reassembles_and_respects_the_size_limit(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..MAX_MESSAGE_SIZE * 3)) {
            let chunks = plan_chunks("corr-1", &bytes);
            let mut reassembled = Vec::new();
            for (i, (meta, window)) in chunks.iter().enumerate() {
                proptest::prop_assert_eq!(meta.seq, i as u64);
                proptest::prop_assert!(window.len() <= MAX_MESSAGE_SIZE);
                reassembled.extend_from_slice(window);
            }
            proptest::prop_assert_eq!(reassembled, bytes);
        }
    }
}
