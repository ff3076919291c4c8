use crate::status::StatusCode;

/// Register-level operations of a TWI peripheral used by the master engine.
///
/// Every call is made with the engine's critical section held, so
/// implementations need no locking of their own. None of the methods may
/// block waiting for the bus: the peripheral reports completion through its
/// interrupt, which must end up calling [`TwiMaster::handle_event`].
///
/// [`TwiMaster::handle_event`]: crate::TwiMaster::handle_event
pub trait TwiHardware {
    /// Turns the peripheral on.
    fn enable(&mut self);

    /// Puts the peripheral back in its power-on state, releasing the bus.
    fn hardware_reset(&mut self);

    fn issue_start(&mut self);

    fn issue_repeated_start(&mut self);

    fn issue_stop(&mut self);

    fn issue_stop_then_start(&mut self) {
        self.issue_stop();
        self.issue_start();
    }

    /// Sends `byte`. Used for both the SLA+R/W byte and data bytes.
    fn transmit_byte(&mut self, byte: u8);

    /// Receives the next byte and acknowledges it.
    fn arm_receive_with_ack(&mut self);

    /// Receives the next byte without acknowledging it (last byte).
    fn arm_receive_with_nack(&mut self);

    /// The byte received by the last receive operation.
    fn received_byte(&mut self) -> u8;

    fn current_status(&mut self) -> StatusCode;

    /// Releases the bus after an illegal START/STOP was detected.
    fn recover_from_bus_error(&mut self);

    fn enable_interrupt(&mut self);

    fn disable_interrupt(&mut self);
}
