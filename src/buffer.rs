use heapless::Deque;

/// An all-or-nothing write did not fit; nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Overflow {
    pub requested: usize,
    pub available: usize,
}

/// Fixed-capacity FIFO of bytes shared by both transfer directions.
///
/// Outgoing data is staged here before the interrupt handler drains it one
/// byte per event; incoming data is accumulated here until the caller reads it.
pub struct ByteBuffer<const N: usize> {
    queue: Deque<u8, N>,
}

impl<const N: usize> ByteBuffer<N> {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Empties the buffer.
    pub fn reset(&mut self) {
        self.queue.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes waiting to be read.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Number of bytes that can still be written.
    pub fn available(&self) -> usize {
        N - self.queue.len()
    }

    /// Appends every byte of `bytes`, or none of them.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, Overflow> {
        let available = self.available();
        if bytes.len() > available {
            return Err(Overflow {
                requested: bytes.len(),
                available,
            });
        }

        for &byte in bytes {
            // Cannot fail, room was checked above.
            let _ = self.queue.push_back(byte);
        }

        Ok(bytes.len())
    }

    /// Drains up to `out.len()` bytes into `out`, returns how many were read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in out.iter_mut() {
            match self.queue.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn write_one(&mut self, byte: u8) -> Result<(), Overflow> {
        self.queue.push_back(byte).map_err(|_| Overflow {
            requested: 1,
            available: 0,
        })
    }

    pub fn read_one(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }
}

impl<const N: usize> Default for ByteBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
