use critical_section::CriticalSection;

use crate::{
    hardware::TwiHardware,
    master::{Shared, TwiMaster},
    status::{StatusCode, StatusRole},
    State,
};

/// Interrupt service routine body. Call it from the TWI interrupt.
pub fn handle_event_interrupt<H: TwiHardware, const N: usize>(master: &TwiMaster<H, N>) {
    master.handle_event()
}

impl<H: TwiHardware, const N: usize> TwiMaster<H, N> {
    /// Advances the state machine by one bus event.
    ///
    /// Must only be called from the peripheral's interrupt, never from code
    /// the interrupt can preempt.
    pub fn handle_event(&self) {
        self.lock(|cs, shared| {
            let status = shared.hardware.current_status();

            match status.role() {
                StatusRole::MasterMode => self.master_mode(cs, shared, status),
                StatusRole::MasterTransmitter => self.master_transmitter(cs, shared, status),
                StatusRole::MasterReceiver => self.master_receiver(cs, shared, status),
                StatusRole::Misc => {
                    error!("twi: bus error");
                    shared.hardware.disable_interrupt();
                    shared.hardware.recover_from_bus_error();
                    shared.buffer.reset();
                    self.set_state(cs, State::BusError);
                }
                StatusRole::Unrecognized => {
                    error!("twi: unexpected status {}", status);
                    self.terminate(cs, shared, State::UnknownError);
                }
            }
        })
    }

    fn master_mode(&self, cs: CriticalSection, shared: &mut Shared<H, N>, status: StatusCode) {
        if status == StatusCode::ArbitrationLost {
            warn!("twi: arbitration lost");
            return self.terminate(cs, shared, State::ArbitrationLost);
        }

        // START or repeated START is on the bus, the address goes next.
        match self.state() {
            State::SlaveAddressWrite => shared.hardware.transmit_byte(shared.address << 1),
            State::SlaveAddressRead => shared.hardware.transmit_byte((shared.address << 1) | 1),
            _ => {
                self.invalid_state(cs, shared);
            }
        }
    }

    fn master_transmitter(&self, cs: CriticalSection, shared: &mut Shared<H, N>, status: StatusCode) {
        match (status, self.state()) {
            (StatusCode::SlaWriteAck, State::SlaveAddressWrite) => {
                self.set_state(cs, State::Transmitting);
                self.send_next_byte(cs, shared);
            }
            (StatusCode::SlaWriteNack, State::SlaveAddressWrite) => {
                self.stop_with(cs, shared, State::NoResponse)
            }
            (StatusCode::DataSentAck, State::Transmitting) => self.send_next_byte(cs, shared),
            (StatusCode::DataSentNack, State::Transmitting) => {
                self.stop_with(cs, shared, State::EndOfWriteDataNack)
            }
            _ => {
                self.invalid_state(cs, shared);
            }
        }
    }

    fn master_receiver(&self, cs: CriticalSection, shared: &mut Shared<H, N>, status: StatusCode) {
        match (status, self.state()) {
            (StatusCode::SlaReadAck, State::SlaveAddressRead) => {
                self.set_state(cs, State::Receiving);
                Self::receive_next_byte(shared);
            }
            (StatusCode::SlaReadNack, State::SlaveAddressRead) => {
                self.stop_with(cs, shared, State::NoResponse)
            }
            (StatusCode::DataReceivedAck, State::Receiving) => {
                if !Self::store_received_byte(shared) {
                    self.invalid_state(cs, shared);
                    return;
                }
                Self::receive_next_byte(shared);
            }
            (StatusCode::DataReceivedNack, State::Receiving) => {
                if !Self::store_received_byte(shared) {
                    self.invalid_state(cs, shared);
                    return;
                }
                shared.hardware.disable_interrupt();
                self.set_state(cs, State::EndOfReadBufferFull);
            }
            _ => {
                self.invalid_state(cs, shared);
            }
        }
    }

    /// The last expected byte is not acknowledged.
    fn receive_next_byte(shared: &mut Shared<H, N>) {
        if shared.pending <= 1 {
            shared.hardware.arm_receive_with_nack();
        } else {
            shared.hardware.arm_receive_with_ack();
        }
    }

    fn store_received_byte(shared: &mut Shared<H, N>) -> bool {
        let byte = shared.hardware.received_byte();
        shared.pending = shared.pending.saturating_sub(1);
        shared.buffer.write_one(byte).is_ok()
    }

    fn stop_with(&self, cs: CriticalSection, shared: &mut Shared<H, N>, state: State) {
        shared.hardware.issue_stop();
        self.terminate(cs, shared, state);
    }

    /// Partial data of a failed transaction is dropped.
    fn terminate(&self, cs: CriticalSection, shared: &mut Shared<H, N>, state: State) {
        shared.hardware.disable_interrupt();
        shared.buffer.reset();
        self.set_state(cs, state);
    }
}
