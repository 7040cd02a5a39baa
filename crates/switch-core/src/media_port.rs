//! RTP/UDPTL port allocation seam. Packetization itself is a host
//! concern (the PBX channel layer owns the actual media sockets), but the
//! SDP answer this engine builds still needs a port number to put on the
//! `m=` line, so the host plugs in whatever pool it uses for that.

use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;

#[async_trait]
pub trait MediaPortAllocator: Send + Sync {
    /// Reserve a port for one media leg of `dialog_id`. Called once per
    /// `m=` line this engine negotiates (audio, video, or image/T.38).
    async fn allocate(&self, dialog_id: &str) -> u16;

    /// Release a previously allocated port. A no-op for allocators that
    /// don't track individual reservations.
    async fn release(&self, _dialog_id: &str, _port: u16) {}
}

/// Hands out even ports from a fixed range, wrapping around. Adequate for
/// tests and single-process hosts; a real deployment tracks RTCP pairing
/// and reuse more carefully than this.
pub struct SequentialPortAllocator {
    next: AtomicU16,
    range_start: u16,
    range_end: u16,
}

impl SequentialPortAllocator {
    pub fn new(range_start: u16, range_end: u16) -> Self {
        SequentialPortAllocator { next: AtomicU16::new(range_start), range_start, range_end }
    }
}

impl Default for SequentialPortAllocator {
    fn default() -> Self {
        Self::new(10000, 20000)
    }
}

#[async_trait]
impl MediaPortAllocator for SequentialPortAllocator {
    async fn allocate(&self, _dialog_id: &str) -> u16 {
        let port = self.next.fetch_add(2, Ordering::Relaxed);
        if port >= self.range_end {
            self.next.store(self.range_start, Ordering::Relaxed);
            self.range_start
        } else {
            port
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hands_out_even_ports_and_wraps() {
        let alloc = SequentialPortAllocator::new(10000, 10004);
        assert_eq!(alloc.allocate("d1").await, 10000);
        assert_eq!(alloc.allocate("d1").await, 10002);
        assert_eq!(alloc.allocate("d1").await, 10000);
    }
}
