use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

use crate::{buffer::Overflow, State};

/// Why a request method did not do what was asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// The engine was not in a state that allows the request. Carries the
    /// state the engine was left in, which keeps an earlier error if there
    /// was one.
    InvalidState(State),
    /// The request does not fit into the buffer.
    Overflow(Overflow),
}

impl From<Overflow> for RequestError {
    fn from(overflow: Overflow) -> Self {
        RequestError::Overflow(overflow)
    }
}

/// Failed transaction, as seen by the blocking wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TwiError {
    NoResponse,
    DataNack,
    BufferSize,
    BusError,
    ArbitrationLost,
    UnknownError,
    ProgrammingError,
}

impl TwiError {
    /// The error a terminal state stands for, `None` if it is not an error.
    pub fn from_state(state: State) -> Option<Self> {
        match state {
            State::NoResponse => Some(TwiError::NoResponse),
            State::EndOfWriteDataNack => Some(TwiError::DataNack),
            State::BufferSizeError => Some(TwiError::BufferSize),
            State::BusError => Some(TwiError::BusError),
            State::ArbitrationLost => Some(TwiError::ArbitrationLost),
            State::UnknownError => Some(TwiError::UnknownError),
            State::ProgrammingError => Some(TwiError::ProgrammingError),
            _ => None,
        }
    }
}

impl From<RequestError> for TwiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::InvalidState(state) => {
                TwiError::from_state(state).unwrap_or(TwiError::ProgrammingError)
            }
            RequestError::Overflow(_) => TwiError::BufferSize,
        }
    }
}

impl embedded_hal::i2c::Error for TwiError {
    fn kind(&self) -> ErrorKind {
        match self {
            TwiError::NoResponse => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            TwiError::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            TwiError::BufferSize => ErrorKind::Overrun,
            TwiError::BusError => ErrorKind::Bus,
            TwiError::ArbitrationLost => ErrorKind::ArbitrationLoss,
            TwiError::UnknownError | TwiError::ProgrammingError => ErrorKind::Other,
        }
    }
}
