use num_enum::FromPrimitive;

/// Prescaler bits share the status register with the status code.
const TWSR_STATUS_MASK: u8 = 0xF8;

/// Status codes reported by the TWI peripheral after every bus event.
///
/// Values follow the AVR TWSR encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StatusCode {
    // Master mode, common to both directions.
    Start = 0x08,
    RepeatedStart = 0x10,
    ArbitrationLost = 0x38,

    // Master transmitter.
    SlaWriteAck = 0x18,
    SlaWriteNack = 0x20,
    DataSentAck = 0x28,
    DataSentNack = 0x30,

    // Master receiver.
    SlaReadAck = 0x40,
    SlaReadNack = 0x48,
    DataReceivedAck = 0x50,
    DataReceivedNack = 0x58,

    // Misc.
    BusError = 0x00,
    /// No relevant state information, the peripheral is still working.
    NoInfo = 0xF8,

    #[num_enum(catch_all)]
    Unrecognized(u8),
}

/// Role a [`StatusCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusRole {
    MasterMode,
    MasterTransmitter,
    MasterReceiver,
    Misc,
    Unrecognized,
}

impl StatusCode {
    /// Decodes a raw status register value, ignoring the prescaler bits.
    pub fn from_twsr(twsr: u8) -> Self {
        Self::from_primitive(twsr & TWSR_STATUS_MASK)
    }

    pub fn role(self) -> StatusRole {
        match self {
            StatusCode::Start | StatusCode::RepeatedStart | StatusCode::ArbitrationLost => {
                StatusRole::MasterMode
            }
            StatusCode::SlaWriteAck
            | StatusCode::SlaWriteNack
            | StatusCode::DataSentAck
            | StatusCode::DataSentNack => StatusRole::MasterTransmitter,
            StatusCode::SlaReadAck
            | StatusCode::SlaReadNack
            | StatusCode::DataReceivedAck
            | StatusCode::DataReceivedNack => StatusRole::MasterReceiver,
            StatusCode::BusError => StatusRole::Misc,
            StatusCode::NoInfo | StatusCode::Unrecognized(_) => StatusRole::Unrecognized,
        }
    }
}
