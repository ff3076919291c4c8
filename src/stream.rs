use bytemuck::Pod;

use crate::{
    buffer::Overflow, error::RequestError, hardware::TwiHardware, master::TwiMaster, Address,
    State,
};

/// Byte-stream view of one transaction with one device.
///
/// Sends START on [`open`](Self::open) and STOP on [`close`](Self::close) or
/// drop. Writes and reads may be mixed freely; the direction changes with a
/// repeated START. Every call that needs the bus to settle spins until it
/// does, so the TWI interrupt has to be live.
///
/// ```ignore
/// let mut conn = Connection::open(&TWI, 0x68)?;
/// conn.write(&[0x3B])?;
/// conn.request(6)?;
/// let accel: [i16; 3] = conn.read_value()?;
/// conn.close();
/// ```
pub struct Connection<'a, H: TwiHardware, const N: usize> {
    master: &'a TwiMaster<H, N>,
    address: Address,
}

impl<'a, H: TwiHardware, const N: usize> Connection<'a, H, N> {
    pub fn open(master: &'a TwiMaster<H, N>, address: Address) -> Result<Self, RequestError> {
        master.send_start()?;
        Ok(Self { master, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Queues `bytes` for the device. Does not wait for them to go out.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, RequestError> {
        match self.master.state() {
            State::ReadOrWrite => self.master.write_to(self.address, bytes),
            State::EndOfRead => {
                self.master.send_repeated_start()?;
                self.master.write_to(self.address, bytes)
            }
            _ => self.master.write(bytes),
        }
    }

    pub fn write_value<T: Pod>(&mut self, value: &T) -> Result<usize, RequestError> {
        self.write(bytemuck::bytes_of(value))
    }

    /// Asks the device for `n` bytes, to be picked up with
    /// [`read`](Self::read) or [`read_value`](Self::read_value).
    ///
    /// If the preceding write failed, its error state is returned and no
    /// START goes out.
    pub fn request(&mut self, n: usize) -> Result<usize, RequestError> {
        if n > N {
            return Err(RequestError::Overflow(Overflow {
                requested: n,
                available: N,
            }));
        }

        match self.master.wait_until_not_busy() {
            state if state.has_error() => return Err(RequestError::InvalidState(state)),
            State::Ok => self.master.send_start()?,
            State::ReadOrWrite => {}
            _ => self.master.send_repeated_start()?,
        }

        self.master.read_from(self.address, n)
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, RequestError> {
        self.master.wait_until_not_busy();
        self.master.read_buffer(out)
    }

    pub fn read_value<T: Pod>(&mut self) -> Result<T, RequestError> {
        self.master.wait_until_not_busy();
        self.master.read_buffer_value()
    }

    /// Waits for pending bytes and releases the bus.
    ///
    /// Returns the state the transaction ended in, so a write that was never
    /// acknowledged still shows up after the fact.
    pub fn close(self) -> State {
        // Drop runs `end` again and finds the engine idle.
        self.end()
    }

    fn end(&self) -> State {
        let state = self.master.wait_until_not_busy();
        self.master.send_stop();
        state
    }
}

impl<H: TwiHardware, const N: usize> Drop for Connection<'_, H, N> {
    fn drop(&mut self) {
        self.end();
    }
}
