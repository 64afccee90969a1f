// SPDX-License-Identifier: BUSL-1.1

//! Wire envelope for the netvigil agent control plane.
//!
//! Both `netvigil-server` and `netvigil-agent` depend on this crate so the
//! two binaries can never drift on field names or enum tags — it is the
//! single canonical source for the envelope, as recommended by
//! `groblegark-coop`'s own `events.rs` doc comment for its shared event type.

pub mod chunk;
pub mod envelope;
pub mod error;

pub use chunk::ChunkMeta;
pub use envelope::{Envelope, MessageType};
pub use error::{ErrorBody, ErrorKind};

/// Maximum size, in bytes, of a single control-plane message (text frame).
/// Larger payloads (backup artifacts) go over the chunked binary stream
/// instead — see [`chunk`].
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
