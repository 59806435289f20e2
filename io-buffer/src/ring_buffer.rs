use std::fmt;

/// Growable circular byte buffer with bounded backward replay.
///
/// Cursors are absolute stream offsets: `start` is the oldest offset still
/// held, `read_pos` the consumer position, `write_pos` the producer
/// position. The unread length and the replay window are derived from them
/// on every call instead of being adjusted incrementally, so no
/// interleaving of write/read/rewind/grow can desynchronise the
/// bookkeeping. A single physical index (`head`) maps `start` onto the
/// backing storage; all other position math goes through `phys`.
pub struct RingBuffer {
    storage: Vec<u8>,
    head: usize,
    start: u64,
    read_pos: u64,
    write_pos: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        // a zero capacity would leave the modulo math undefined
        let capacity = capacity.max(1);
        Self {
            storage: vec![0u8; capacity],
            head: 0,
            start: 0,
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes written but not yet read.
    pub fn len(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Bytes already read that `rewind` can still replay.
    pub fn rewindable(&self) -> u64 {
        self.read_pos - self.start
    }

    /// Logical consumer offset from the beginning of the stream.
    pub fn position(&self) -> u64 {
        self.read_pos
    }

    /// Cumulative bytes ever written.
    pub fn total_written(&self) -> u64 {
        self.write_pos
    }

    // Physical index of an absolute offset. Valid for offsets inside the
    // retained window [start, start + capacity].
    fn phys(&self, pos: u64) -> usize {
        debug_assert!(pos >= self.start);
        debug_assert!(pos - self.start <= self.capacity() as u64);
        (self.head + (pos - self.start) as usize) % self.capacity()
    }

    /// Ensure at least `wanted` bytes of capacity, copying into a larger
    /// block if needed. Growth at least doubles the current capacity, so
    /// the retained window can never wrap a second time within one growth
    /// step. Capacity never shrinks.
    pub fn expand_to(&mut self, wanted: usize) {
        if wanted <= self.capacity() {
            return;
        }
        let target = wanted.max(self.capacity().saturating_mul(2));
        let mut next = vec![0u8; target];

        // unwrap the retained window [start, write_pos) into the front of
        // the new block
        let window = (self.write_pos - self.start) as usize;
        let first = window.min(self.capacity() - self.head);
        next[..first].copy_from_slice(&self.storage[self.head..self.head + first]);
        next[first..window].copy_from_slice(&self.storage[..window - first]);

        self.storage = next;
        self.head = 0;
    }

    /// Append `data`. If the unread bytes plus `data` would not fit, one
    /// growth pass runs first. Appending may overwrite already-read bytes;
    /// the replay horizon then advances so `rewind` never exposes them.
    /// Unread bytes are never overwritten.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.expand_to(self.len() + data.len());

        let cap = self.capacity();
        let w = self.phys(self.write_pos);
        let first = data.len().min(cap - w);
        self.storage[w..w + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);
        self.write_pos += data.len() as u64;

        // bytes behind the new horizon were just overwritten
        if self.write_pos - self.start > cap as u64 {
            let horizon = self.write_pos - cap as u64;
            self.head = self.phys(horizon);
            self.start = horizon;
        }
    }

    /// Copy up to `dest.len()` unread bytes into `dest` and advance the
    /// consumer cursor. Returns the count actually copied, 0 when nothing
    /// is unread.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.len());
        if n == 0 {
            return 0;
        }
        let cap = self.capacity();
        let r = self.phys(self.read_pos);
        let first = n.min(cap - r);
        dest[..first].copy_from_slice(&self.storage[r..r + first]);
        dest[first..n].copy_from_slice(&self.storage[..n - first]);
        self.read_pos += n as u64;
        n
    }

    /// Move the consumer cursor backward by up to `len` bytes, clamped to
    /// the replay window. Returns the distance actually rewound.
    pub fn rewind(&mut self, len: u64) -> u64 {
        let n = len.min(self.rewindable());
        self.read_pos -= n;
        n
    }

    /// Discard up to `len` unread bytes without copying them out. The
    /// skipped bytes stay in the replay window. Returns the distance
    /// actually skipped.
    pub fn skip(&mut self, len: u64) -> u64 {
        let n = len.min(self.len() as u64);
        self.read_pos += n;
        n
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("start", &self.start)
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .field("len", &self.len())
            .field("rewindable", &self.rewindable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_identity_across_wraparounds() {
        let mut buf = RingBuffer::new(7);
        let data: Vec<u8> = (0u32..997).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let mut scratch = [0u8; 5];
        let mut fed = 0;
        while out.len() < data.len() {
            if fed < data.len() {
                let n = (data.len() - fed).min(3);
                buf.write(&data[fed..fed + n]);
                fed += n;
            }
            let got = buf.read(&mut scratch);
            out.extend_from_slice(&scratch[..got]);
        }
        assert_eq!(out, data);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.total_written(), data.len() as u64);
    }

    #[test]
    fn test_growth_preserves_straddling_unread() {
        let mut buf = RingBuffer::new(8);
        buf.write(b"abcdef");
        let mut tmp = [0u8; 4];
        assert_eq!(buf.read(&mut tmp), 4);
        assert_eq!(&tmp, b"abcd");

        // this write wraps around the end of the storage
        buf.write(b"ghij");
        // this one no longer fits and forces a single growth pass while
        // the unread window straddles the boundary
        buf.write(b"klmnopqr");
        assert!(buf.capacity() >= 14);

        let mut out = vec![0u8; 14];
        assert_eq!(buf.read(&mut out), 14);
        assert_eq!(&out, b"efghijklmnopqr");
    }

    #[test]
    fn test_overwrite_advances_replay_horizon() {
        let mut buf = RingBuffer::new(8);
        buf.write(b"ABCDE");
        let mut tmp = [0u8; 3];
        assert_eq!(buf.read(&mut tmp), 3);
        assert_eq!(&tmp, b"ABC");

        // fits without growing, but overwrites the already-read "ABC"
        buf.write(b"FGHIJK");
        assert_eq!(buf.rewindable(), 0);

        let mut out = [0u8; 8];
        assert_eq!(buf.read(&mut out), 8);
        assert_eq!(&out, b"DEFGHIJK");
    }

    #[test]
    fn test_rewind_replays_prior_read() {
        let mut buf = RingBuffer::new(16);
        buf.write(b"0123456789");
        let mut first = [0u8; 6];
        assert_eq!(buf.read(&mut first), 6);

        assert_eq!(buf.rewind(4), 4);
        assert_eq!(buf.position(), 2);

        let mut again = [0u8; 4];
        assert_eq!(buf.read(&mut again), 4);
        assert_eq!(&again, &first[2..6]);
    }

    #[test]
    fn test_rewind_clamps_to_window() {
        let mut buf = RingBuffer::new(8);
        buf.write(b"abcd");
        let mut tmp = [0u8; 2];
        assert_eq!(buf.read(&mut tmp), 2);

        assert_eq!(buf.rewind(100), 2);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.rewind(1), 0);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_zero_length_ops_are_noops() {
        let mut buf = RingBuffer::new(4);
        buf.write(b"xy");
        let mut tmp = [0u8; 1];
        assert_eq!(buf.read(&mut tmp), 1);

        buf.write(&[]);
        assert_eq!(buf.read(&mut []), 0);
        assert_eq!(buf.rewind(0), 0);
        assert_eq!(buf.skip(0), 0);

        assert_eq!(buf.position(), 1);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.rewindable(), 1);
    }

    #[test]
    fn test_read_empty_returns_zero() {
        let mut buf = RingBuffer::new(4);
        let mut tmp = [0u8; 4];
        assert_eq!(buf.read(&mut tmp), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_skip_stays_replayable() {
        let mut buf = RingBuffer::new(16);
        buf.write(b"hello world");
        assert_eq!(buf.skip(6), 6);
        assert_eq!(buf.position(), 6);

        assert_eq!(buf.rewind(3), 3);
        let mut out = [0u8; 8];
        assert_eq!(buf.read(&mut out), 8);
        assert_eq!(&out, b"lo world");

        // skipping past the unread bytes clamps
        buf.rewind(2);
        assert_eq!(buf.skip(100), 2);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_growth_truncates_replay_window_when_needed() {
        let mut buf = RingBuffer::new(8);
        buf.write(b"abcdefgh");
        let mut tmp = [0u8; 8];
        assert_eq!(buf.read(&mut tmp), 8);
        assert_eq!(buf.rewindable(), 8);

        // 12 unread bytes force growth to 16; the window (8 replayable +
        // 12 unread) exceeds that, so the oldest replay bytes fall off
        buf.write(&[b'x'; 12]);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.rewindable(), 4);

        assert_eq!(buf.rewind(8), 4);
        let mut out = vec![0u8; 16];
        assert_eq!(buf.read(&mut out), 16);
        assert_eq!(&out[..4], b"efgh");
        assert!(out[4..].iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_pre_expansion_keeps_replay_window() {
        let mut buf = RingBuffer::new(8);
        buf.expand_to(32);
        assert_eq!(buf.capacity(), 32);

        buf.write(b"abcdefgh");
        let mut tmp = [0u8; 8];
        assert_eq!(buf.read(&mut tmp), 8);
        buf.write(&[b'y'; 12]);

        // no further growth, so the whole history stays replayable
        assert_eq!(buf.capacity(), 32);
        assert_eq!(buf.rewindable(), 8);
        assert_eq!(buf.rewind(8), 8);

        let mut out = vec![0u8; 20];
        assert_eq!(buf.read(&mut out), 20);
        assert_eq!(&out[..8], b"abcdefgh");
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let mut buf = RingBuffer::new(0);
        buf.write(b"ab");
        let mut tmp = [0u8; 2];
        assert_eq!(buf.read(&mut tmp), 2);
        assert_eq!(&tmp, b"ab");
    }
}
