//! Common types and abstractions
//!
//! This module defines the core types used throughout the crate:
//! - Stream: unified async I/O abstraction
//! - PacketConn: datagram view of a stream session
//! - Network / Metadata: request kind and opaque node data
//! - Address: network address representation

mod address;
mod metadata;
mod packet;
mod stream;

pub use address::{join_host_port, split_host_port, Address};
pub use metadata::{Metadata, Network};
pub use packet::{PacketConn, StreamPacketConn};
pub use stream::{AsyncReadWrite, BoxedStream, IntoStream, Stream};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
