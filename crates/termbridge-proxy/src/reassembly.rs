//! Byte-stream reassembly: turns frame payloads into caller-sized reads.

use bytes::{Buf, BytesMut};

/// Bytes received in frames but not yet handed to a byte-oriented reader.
///
/// Single-consumer: callers serialise access (the proxy wraps it in a mutex).
#[derive(Debug, Default)]
pub struct StreamBuffer {
    pending: BytesMut,
}

impl StreamBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy up to `dst.len()` pending bytes into `dst` and consume them.
    ///
    /// Returns 0 when nothing is pending. Never blocks.
    pub fn load(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.pending.len());
        if n > 0 {
            dst[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
        }
        n
    }

    /// Append `chunk`, then [`load`](Self::load) into `dst`.
    pub fn feed(&mut self, dst: &mut [u8], chunk: &[u8]) -> usize {
        self.pending.extend_from_slice(chunk);
        self.load(dst)
    }

    /// Number of bytes still pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn load_from_empty_returns_zero() {
        let mut buf = StreamBuffer::new();
        let mut dst = [0u8; 8];
        assert_eq!(buf.load(&mut dst), 0);
    }

    #[test]
    fn feed_smaller_than_dst() {
        let mut buf = StreamBuffer::new();
        let mut dst = [0u8; 8];
        let n = buf.feed(&mut dst, b"abc");
        assert_eq!(n, 3);
        assert_eq!(&dst[..n], b"abc");
        assert!(buf.is_empty());
    }

    #[test]
    fn excess_stays_buffered() {
        let mut buf = StreamBuffer::new();
        let mut dst = [0u8; 4];
        let n = buf.feed(&mut dst, b"hello world");
        assert_eq!(&dst[..n], b"hell");
        assert_eq!(buf.len(), 7);

        let n = buf.load(&mut dst);
        assert_eq!(&dst[..n], b"o wo");
        let n = buf.load(&mut dst);
        assert_eq!(&dst[..n], b"rld");
        assert_eq!(buf.load(&mut dst), 0);
    }

    #[test]
    fn feed_appends_after_leftovers() {
        let mut buf = StreamBuffer::new();
        let mut dst = [0u8; 2];
        let _ = buf.feed(&mut dst, b"abc");
        let n = buf.feed(&mut dst, b"de");
        assert_eq!(&dst[..n], b"cd");
        let n = buf.load(&mut dst);
        assert_eq!(&dst[..n], b"e");
    }

    #[test]
    fn zero_length_dst_consumes_nothing() {
        let mut buf = StreamBuffer::new();
        let n = buf.feed(&mut [], b"xyz");
        assert_eq!(n, 0);
        assert_eq!(buf.len(), 3);
    }

    proptest! {
        #[test]
        fn drains_exact_bytes_in_order(
            chunk in proptest::collection::vec(any::<u8>(), 0..512),
            read_size in 1usize..64,
        ) {
            let mut buf = StreamBuffer::new();
            let mut dst = vec![0u8; read_size];
            let mut out = Vec::new();

            let n = buf.feed(&mut dst, &chunk);
            out.extend_from_slice(&dst[..n]);
            loop {
                let n = buf.load(&mut dst);
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&dst[..n]);
            }

            prop_assert_eq!(out, chunk);
            prop_assert!(buf.is_empty());
        }
    }
}
