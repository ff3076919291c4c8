#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod buffer;
mod error;
mod hal;
mod hardware;
mod interrupts;
mod master;
mod state_holder;
mod status;
mod stream;

#[cfg(test)]
mod sim;

pub use buffer::{ByteBuffer, Overflow};
pub use error::{RequestError, TwiError};
pub use hal::BlockingTwi;
pub use hardware::TwiHardware;
pub use interrupts::handle_event_interrupt;
pub use master::{TwiMaster, MAX_TIMEOUT_US, PROBE_TIMEOUT_US};
pub use status::{StatusCode, StatusRole};
pub use stream::Connection;

#[cfg(feature = "dump")]
pub use master::StateDump;

/// 7-bit device address, `0..=127`.
pub type Address = u8;

/// Activity group a [`State`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// No transaction in progress. Every error state is idle.
    Idle,
    /// The interrupt handler owns the bus and is moving bytes.
    Busy,
    /// A transaction phase finished; the caller has to decide what comes next.
    Waiting,
}

/// Transaction state of a [`TwiMaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Ok,
    /// START sent, waiting for `write_to` or `read_from`.
    ReadOrWrite,
    SlaveAddressWrite,
    SlaveAddressRead,
    Transmitting,
    /// Every queued byte was acknowledged. More bytes may be appended.
    EndOfWrite,
    EndOfWriteDataNack,
    BufferSizeError,
    Receiving,
    /// All requested bytes are in the buffer, waiting for `read_buffer`.
    EndOfReadBufferFull,
    EndOfRead,
    NoResponse,
    BusError,
    ArbitrationLost,
    UnknownError,
    ProgrammingError,
}

impl State {
    pub const fn activity(self) -> Activity {
        match self {
            State::Ok
            | State::EndOfWriteDataNack
            | State::BufferSizeError
            | State::NoResponse
            | State::BusError
            | State::ArbitrationLost
            | State::UnknownError
            | State::ProgrammingError => Activity::Idle,
            State::SlaveAddressWrite
            | State::SlaveAddressRead
            | State::Transmitting
            | State::Receiving => Activity::Busy,
            State::ReadOrWrite | State::EndOfWrite | State::EndOfReadBufferFull | State::EndOfRead => {
                Activity::Waiting
            }
        }
    }

    /// The transaction ended with a failure.
    pub const fn has_error(self) -> bool {
        matches!(
            self,
            State::EndOfWriteDataNack
                | State::BufferSizeError
                | State::NoResponse
                | State::BusError
                | State::ArbitrationLost
                | State::UnknownError
                | State::ProgrammingError
        )
    }

    pub const fn is_idle(self) -> bool {
        matches!(self.activity(), Activity::Idle)
    }

    pub const fn is_busy(self) -> bool {
        matches!(self.activity(), Activity::Busy)
    }

    pub const fn is_waiting(self) -> bool {
        matches!(self.activity(), Activity::Waiting)
    }
}
