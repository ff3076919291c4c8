use core::{
    cell::RefCell,
    future::poll_fn,
    mem::size_of,
    task::Poll,
};

use bytemuck::Pod;
use critical_section::{CriticalSection, Mutex};
use embassy_sync::waitqueue::AtomicWaker;
use embedded_hal::delay::DelayNs;

use crate::{
    buffer::{ByteBuffer, Overflow},
    error::RequestError,
    hardware::TwiHardware,
    state_holder::StateHolder,
    Address, State,
};

pub const STATES_HISTORY_SIZE: usize = 5;

/// Default timeout of [`TwiMaster::wait_while_busy`] callers, in microseconds.
pub const MAX_TIMEOUT_US: u32 = u16::MAX as u32;

/// How long [`TwiMaster::probe`] waits for the address to be acknowledged.
pub const PROBE_TIMEOUT_US: u32 = 1_000;

const MAX_ADDRESS: Address = 0x7F;

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateDump {
    pub state_history: [State; STATES_HISTORY_SIZE],
    pub current_state: State,
}

/// Everything both the foreground and the interrupt handler write to.
pub(crate) struct Shared<H, const N: usize> {
    pub(crate) hardware: H,
    pub(crate) buffer: ByteBuffer<N>,
    pub(crate) address: Address,
    /// Bytes still expected in receiver mode.
    pub(crate) pending: usize,
}

/// Buffered, interrupt-driven TWI (I2C) bus master.
///
/// One instance per physical bus, usually a `static`. Foreground code drives
/// transactions through the request methods and polls [`state`](Self::state);
/// the peripheral's interrupt handler calls [`handle_event`](Self::handle_event)
/// once per bus event.
///
/// ```ignore
/// static TWI: TwiMaster<Twi0, 16> = TwiMaster::new(Twi0::new());
///
/// #[interrupt]
/// fn TWI() {
///     handle_event_interrupt(&TWI);
/// }
///
/// TWI.init();
/// TWI.send_start()?;
/// TWI.write_to(0x68, &[0x75])?;
/// TWI.wait_until_not_busy();
/// TWI.send_repeated_start()?;
/// TWI.read_from(0x68, 1)?;
/// TWI.wait_until_not_busy();
/// let mut id = [0u8];
/// TWI.read_buffer(&mut id)?;
/// TWI.send_stop();
/// ```
pub struct TwiMaster<H, const N: usize> {
    shared: Mutex<RefCell<Shared<H, N>>>,
    state_holder: StateHolder<STATES_HISTORY_SIZE>,
    waker: AtomicWaker,
}

impl<H: TwiHardware, const N: usize> TwiMaster<H, N> {
    pub const fn new(hardware: H) -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                hardware,
                buffer: ByteBuffer::new(),
                address: 0,
                pending: 0,
            })),
            state_holder: StateHolder::new(),
            waker: AtomicWaker::new(),
        }
    }

    /// Turns the peripheral on and leaves the engine in [`State::Ok`].
    pub fn init(&self) {
        self.lock(|cs, shared| {
            shared.hardware.enable();
            shared.hardware.disable_interrupt();
            shared.buffer.reset();
            shared.pending = 0;
            self.set_state(cs, State::Ok);
        })
    }

    /// Re-initializes the peripheral and drops whatever was in flight.
    ///
    /// Use it when a transaction looks stuck, e.g. a device holding SCL low.
    pub fn reset(&self) {
        self.lock(|cs, shared| {
            Self::quiesce(shared);
            self.set_state(cs, State::Ok);
        })
    }

    /// Starts a transaction. Requires an idle engine; a previous error is
    /// forgotten.
    pub fn send_start(&self) -> Result<(), RequestError> {
        self.lock(|cs, shared| {
            if !self.state().is_idle() {
                return Err(self.reject(cs, shared));
            }

            shared.hardware.issue_start();
            self.set_state(cs, State::ReadOrWrite);
            Ok(())
        })
    }

    /// Switches direction without releasing the bus. Only valid at the end of
    /// a write or of a fully drained read.
    pub fn send_repeated_start(&self) -> Result<(), RequestError> {
        self.lock(|cs, shared| {
            if !matches!(self.state(), State::EndOfWrite | State::EndOfRead) {
                return Err(self.reject(cs, shared));
            }

            shared.hardware.issue_repeated_start();
            self.set_state(cs, State::ReadOrWrite);
            Ok(())
        })
    }

    /// Ends the transaction from any state. Does nothing when idle.
    pub fn send_stop(&self) {
        self.lock(|cs, shared| {
            if self.state().is_idle() {
                return;
            }

            shared.hardware.issue_stop();
            shared.hardware.disable_interrupt();
            self.set_state(cs, State::Ok);
        })
    }

    /// Queues `bytes` and starts a write to `address`.
    ///
    /// Returns the number of bytes queued. If `bytes` does not fit into the
    /// buffer nothing is sent and the engine stays in
    /// [`State::ReadOrWrite`].
    pub fn write_to(&self, address: Address, bytes: &[u8]) -> Result<usize, RequestError> {
        self.lock(|cs, shared| {
            if self.state() != State::ReadOrWrite || address > MAX_ADDRESS {
                return Err(self.reject(cs, shared));
            }

            shared.buffer.reset();
            let n = shared.buffer.write(bytes)?;

            shared.address = address;
            self.set_state(cs, State::SlaveAddressWrite);
            shared.hardware.enable_interrupt();

            Ok(n)
        })
    }

    /// Appends `bytes` to the write in progress, all or nothing.
    ///
    /// If the previous bytes were already sent ([`State::EndOfWrite`]) the
    /// transfer is resumed.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, RequestError> {
        // The interrupt handler may be draining the buffer right now.
        self.lock(|cs, shared| {
            let state = self.state();
            if !matches!(
                state,
                State::SlaveAddressWrite | State::Transmitting | State::EndOfWrite
            ) {
                return Err(self.reject(cs, shared));
            }

            let n = shared.buffer.write(bytes)?;

            if state == State::EndOfWrite {
                self.set_state(cs, State::Transmitting);
                self.send_next_byte(cs, shared);

                if self.state() == State::Transmitting {
                    shared.hardware.enable_interrupt();
                }
            }

            Ok(n)
        })
    }

    /// Starts reading exactly `n` bytes from `address`.
    ///
    /// `n` larger than the buffer ends the transaction in
    /// [`State::BufferSizeError`] without touching the bus; nothing is read.
    /// The START already sent stays on the bus until the next START.
    pub fn read_from(&self, address: Address, n: usize) -> Result<usize, RequestError> {
        self.lock(|cs, shared| {
            if self.state() != State::ReadOrWrite || n == 0 || address > MAX_ADDRESS {
                return Err(self.reject(cs, shared));
            }

            if n > N {
                warn!("twi: read of {} bytes does not fit in {}", n, N);
                self.set_state(cs, State::BufferSizeError);
                return Err(RequestError::Overflow(Overflow {
                    requested: n,
                    available: N,
                }));
            }

            shared.pending = n;
            shared.buffer.reset();
            shared.address = address;
            self.set_state(cs, State::SlaveAddressRead);
            shared.hardware.enable_interrupt();

            Ok(n)
        })
    }

    /// Moves up to `out.len()` received bytes into `out`.
    ///
    /// Once the buffer is empty the engine moves to [`State::EndOfRead`].
    pub fn read_buffer(&self, out: &mut [u8]) -> Result<usize, RequestError> {
        self.lock(|cs, shared| {
            if self.state() != State::EndOfReadBufferFull {
                return Err(self.reject(cs, shared));
            }

            let n = shared.buffer.read(out);
            if shared.buffer.is_empty() {
                self.set_state(cs, State::EndOfRead);
            }

            Ok(n)
        })
    }

    /// [`write_to`](Self::write_to) for a plain value, in native byte order.
    pub fn write_to_value<T: Pod>(&self, address: Address, value: &T) -> Result<usize, RequestError> {
        self.write_to(address, bytemuck::bytes_of(value))
    }

    /// [`write`](Self::write) for a plain value, in native byte order.
    pub fn write_value<T: Pod>(&self, value: &T) -> Result<usize, RequestError> {
        self.write(bytemuck::bytes_of(value))
    }

    /// Reads one `T` out of the receive buffer, in native byte order.
    ///
    /// Nothing is drained unless the whole value is available.
    pub fn read_buffer_value<T: Pod>(&self) -> Result<T, RequestError> {
        self.lock(|cs, shared| {
            if self.state() != State::EndOfReadBufferFull {
                return Err(self.reject(cs, shared));
            }

            let len = shared.buffer.len();
            if len < size_of::<T>() {
                return Err(RequestError::Overflow(Overflow {
                    requested: size_of::<T>(),
                    available: len,
                }));
            }

            let mut value: T = bytemuck::Zeroable::zeroed();
            shared.buffer.read(bytemuck::bytes_of_mut(&mut value));
            if shared.buffer.is_empty() {
                self.set_state(cs, State::EndOfRead);
            }

            Ok(value)
        })
    }

    /// Spins until the engine is not busy and returns the state it reached.
    pub fn wait_until_not_busy(&self) -> State {
        loop {
            let state = self.state();
            if !state.is_busy() {
                return state;
            }
            core::hint::spin_loop();
        }
    }

    /// Waits while busy, at most `timeout_us` microseconds.
    ///
    /// Returns the microseconds left before the timeout; `0` means it expired.
    pub fn wait_while_busy<D: DelayNs>(&self, delay: &mut D, timeout_us: u32) -> u32 {
        let mut elapsed = 0;
        while elapsed < timeout_us && self.is_busy() {
            delay.delay_us(1);
            elapsed += 1;
        }
        timeout_us - elapsed
    }

    /// [`wait_while_busy`](Self::wait_while_busy) with [`MAX_TIMEOUT_US`].
    pub fn wait_while_busy_max<D: DelayNs>(&self, delay: &mut D) -> u32 {
        self.wait_while_busy(delay, MAX_TIMEOUT_US)
    }

    /// Resolves as soon as the engine is not busy.
    pub async fn until_not_busy(&self) -> State {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            let state = self.state();
            if state.is_busy() {
                Poll::Pending
            } else {
                Poll::Ready(state)
            }
        })
        .await
    }

    /// Checks whether a device answers at `address`.
    ///
    /// Resets the engine first, so it must not be used in the middle of a
    /// transaction. Always leaves the bus released.
    pub fn probe<D: DelayNs>(&self, address: Address, delay: &mut D) -> bool {
        self.reset();

        if self.send_start().is_err() {
            return false;
        }

        if self.write_to(address, &[]).is_err() {
            self.send_stop();
            return false;
        }

        self.wait_while_busy(delay, PROBE_TIMEOUT_US);
        let found = self.state() == State::EndOfWrite;
        self.send_stop();

        debug!("twi: probe {=u8:#x}: {}", address, found);
        found
    }

    /// Runs `f` on the peripheral, for configuration the engine knows nothing
    /// about (bus speed, own slave address, ...).
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.lock(|_, shared| f(&mut shared.hardware))
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> StateDump {
        let mut states = [State::Ok; STATES_HISTORY_SIZE];
        critical_section::with(|cs| self.state_holder.history_into(cs, &mut states));

        StateDump {
            state_history: states,
            current_state: self.state(),
        }
    }

    pub(crate) fn lock<R>(&self, f: impl FnOnce(CriticalSection, &mut Shared<H, N>) -> R) -> R {
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            f(cs, &mut shared)
        })
    }

    pub(crate) fn set_state(&self, cs: CriticalSection, state: State) {
        self.state_holder.set_state(cs, state);
        if !state.is_busy() {
            self.waker.wake();
        }
    }

    /// Sends the next queued byte, or parks in [`State::EndOfWrite`] when
    /// there is none.
    pub(crate) fn send_next_byte(&self, cs: CriticalSection, shared: &mut Shared<H, N>) {
        match shared.buffer.read_one() {
            Some(byte) => shared.hardware.transmit_byte(byte),
            None => {
                shared.hardware.disable_interrupt();
                self.set_state(cs, State::EndOfWrite);
            }
        }
    }

    /// Handles a request or event that is not valid in the current state.
    ///
    /// Keeps the first error that happened, so a `NoResponse` followed by a
    /// `write` still reads as `NoResponse`. The peripheral is reset either way.
    pub(crate) fn invalid_state(&self, cs: CriticalSection, shared: &mut Shared<H, N>) -> State {
        let current = self.state();
        let state = if current.has_error() {
            current
        } else {
            State::ProgrammingError
        };

        warn!("twi: invalid state {}, now {}", current, state);
        Self::quiesce(shared);
        self.set_state(cs, state);
        state
    }

    fn reject(&self, cs: CriticalSection, shared: &mut Shared<H, N>) -> RequestError {
        RequestError::InvalidState(self.invalid_state(cs, shared))
    }

    fn quiesce(shared: &mut Shared<H, N>) {
        debug!("twi: hardware reset");
        shared.hardware.hardware_reset();
        shared.hardware.enable();
        shared.hardware.disable_interrupt();
        shared.buffer.reset();
        shared.pending = 0;
    }
}

impl<H, const N: usize> TwiMaster<H, N> {
    pub fn state(&self) -> State {
        self.state_holder.get_state()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently held in the buffer.
    pub fn buffered(&self) -> usize {
        critical_section::with(|cs| self.shared.borrow_ref(cs).buffer.len())
    }

    pub fn is_idle(&self) -> bool {
        self.state().is_idle()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    pub fn is_waiting(&self) -> bool {
        self.state().is_waiting()
    }

    pub fn has_error(&self) -> bool {
        self.state().has_error()
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.state(), State::SlaveAddressWrite | State::Transmitting)
    }

    pub fn is_reading(&self) -> bool {
        matches!(
            self.state(),
            State::SlaveAddressRead | State::Receiving | State::EndOfReadBufferFull
        )
    }

    pub fn is_ok(&self) -> bool {
        self.state() == State::Ok
    }

    pub fn is_read_or_write(&self) -> bool {
        self.state() == State::ReadOrWrite
    }

    pub fn is_transmitting(&self) -> bool {
        self.state() == State::Transmitting
    }

    pub fn is_end_of_write(&self) -> bool {
        self.state() == State::EndOfWrite
    }

    pub fn is_end_of_write_data_nack(&self) -> bool {
        self.state() == State::EndOfWriteDataNack
    }

    pub fn is_buffer_size_error(&self) -> bool {
        self.state() == State::BufferSizeError
    }

    pub fn is_receiving(&self) -> bool {
        self.state() == State::Receiving
    }

    pub fn is_end_of_read_buffer_full(&self) -> bool {
        self.state() == State::EndOfReadBufferFull
    }

    pub fn is_end_of_read(&self) -> bool {
        self.state() == State::EndOfRead
    }

    pub fn is_no_response(&self) -> bool {
        self.state() == State::NoResponse
    }

    pub fn is_bus_error(&self) -> bool {
        self.state() == State::BusError
    }

    pub fn is_arbitration_lost(&self) -> bool {
        self.state() == State::ArbitrationLost
    }

    pub fn is_unknown_error(&self) -> bool {
        self.state() == State::UnknownError
    }

    pub fn is_programming_error(&self) -> bool {
        self.state() == State::ProgrammingError
    }
}
