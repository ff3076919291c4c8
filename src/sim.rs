//! Simulated TWI peripheral with one loopback device, for host tests.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use embedded_hal::delay::DelayNs;

use crate::{hardware::TwiHardware, status::StatusCode, Address, TwiMaster};

pub const DEVICE: Address = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Enable,
    Reset,
    Start,
    RepeatedStart,
    Stop,
    Transmit(u8),
    ReceiveAck,
    ReceiveNack,
    RecoverBusError,
    EnableIrq,
    DisableIrq,
}

/// Every byte written to the device is queued and handed back, in order,
/// to the next reads. Reads with nothing queued return `0xFF`.
pub struct SimBus {
    pub ops: Vec<Op>,
    pub device: Option<Address>,
    pub memory: VecDeque<u8>,
    /// Data bytes still acknowledged before the device NACKs one.
    pub data_acks: Option<usize>,
    /// Bytes delivered before a bus error is reported instead of the next one.
    pub reads_before_bus_error: Option<usize>,
    pub lose_arbitration: bool,
    /// Reported after the next transmitted byte instead of the real outcome.
    pub raw_status: Option<u8>,
    irq_enabled: bool,
    pending: Option<StatusCode>,
    received: u8,
    expecting_address: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            device: Some(DEVICE),
            memory: VecDeque::new(),
            data_acks: None,
            reads_before_bus_error: None,
            lose_arbitration: false,
            raw_status: None,
            irq_enabled: false,
            pending: None,
            received: 0,
            expecting_address: false,
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        self.irq_enabled && self.pending.is_some()
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn count(&self, op: Op) -> usize {
        self.ops.iter().filter(|&&o| o == op).count()
    }

    pub fn transmitted(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Transmit(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    fn receive(&mut self, status: StatusCode) {
        if let Some(left) = self.reads_before_bus_error.as_mut() {
            if *left == 0 {
                self.pending = Some(StatusCode::BusError);
                return;
            }
            *left -= 1;
        }

        self.received = self.memory.pop_front().unwrap_or(0xFF);
        self.pending = Some(status);
    }
}

impl TwiHardware for SimBus {
    fn enable(&mut self) {
        self.ops.push(Op::Enable);
    }

    fn hardware_reset(&mut self) {
        self.ops.push(Op::Reset);
        self.irq_enabled = false;
        self.pending = None;
        self.expecting_address = false;
    }

    fn issue_start(&mut self) {
        self.ops.push(Op::Start);
        self.pending = Some(StatusCode::Start);
        self.expecting_address = true;
    }

    fn issue_repeated_start(&mut self) {
        self.ops.push(Op::RepeatedStart);
        self.pending = Some(StatusCode::RepeatedStart);
        self.expecting_address = true;
    }

    fn issue_stop(&mut self) {
        self.ops.push(Op::Stop);
        self.pending = None;
        self.expecting_address = false;
    }

    fn transmit_byte(&mut self, byte: u8) {
        self.ops.push(Op::Transmit(byte));

        if let Some(raw) = self.raw_status.take() {
            self.pending = Some(StatusCode::from(raw));
            return;
        }

        if self.expecting_address {
            self.expecting_address = false;

            if self.lose_arbitration {
                self.pending = Some(StatusCode::ArbitrationLost);
                return;
            }

            let read = byte & 1 == 1;
            let ack = self.device == Some(byte >> 1);
            self.pending = Some(match (read, ack) {
                (false, true) => StatusCode::SlaWriteAck,
                (false, false) => StatusCode::SlaWriteNack,
                (true, true) => StatusCode::SlaReadAck,
                (true, false) => StatusCode::SlaReadNack,
            });
            return;
        }

        self.pending = match self.data_acks.as_mut() {
            Some(0) => Some(StatusCode::DataSentNack),
            Some(left) => {
                *left -= 1;
                self.memory.push_back(byte);
                Some(StatusCode::DataSentAck)
            }
            None => {
                self.memory.push_back(byte);
                Some(StatusCode::DataSentAck)
            }
        };
    }

    fn arm_receive_with_ack(&mut self) {
        self.ops.push(Op::ReceiveAck);
        self.receive(StatusCode::DataReceivedAck);
    }

    fn arm_receive_with_nack(&mut self) {
        self.ops.push(Op::ReceiveNack);
        self.receive(StatusCode::DataReceivedNack);
    }

    fn received_byte(&mut self) -> u8 {
        self.received
    }

    fn current_status(&mut self) -> StatusCode {
        self.pending.take().unwrap_or(StatusCode::NoInfo)
    }

    fn recover_from_bus_error(&mut self) {
        self.ops.push(Op::RecoverBusError);
        self.pending = None;
        self.expecting_address = false;
    }

    fn enable_interrupt(&mut self) {
        self.ops.push(Op::EnableIrq);
        self.irq_enabled = true;
    }

    fn disable_interrupt(&mut self) {
        self.ops.push(Op::DisableIrq);
        self.irq_enabled = false;
    }
}

pub fn master<const N: usize>() -> TwiMaster<SimBus, N> {
    let master = TwiMaster::new(SimBus::new());
    master.init();
    master
}

/// Raises the interrupt once if the peripheral has an event for it.
pub fn fire_one<const N: usize>(master: &TwiMaster<SimBus, N>) -> bool {
    critical_section::with(|_| {
        if master.with_hardware(|bus| bus.interrupt_pending()) {
            master.handle_event();
            true
        } else {
            false
        }
    })
}

/// Services interrupts until the peripheral goes quiet.
pub fn run<const N: usize>(master: &TwiMaster<SimBus, N>) -> usize {
    let mut events = 0;
    while fire_one(master) {
        events += 1;
        assert!(events < 10_000, "interrupt storm");
    }
    events
}

/// Runs `f` while another thread plays the interrupt handler.
pub fn with_isr<const N: usize, R>(master: &TwiMaster<SimBus, N>, f: impl FnOnce() -> R) -> R {
    struct Done<'a>(&'a AtomicBool);

    impl Drop for Done<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                if !fire_one(master) {
                    std::thread::yield_now();
                }
            }
        });

        let _done = Done(&done);
        f()
    })
}

/// Every delay step services one interrupt.
pub struct IsrDelay<'a, const N: usize>(pub &'a TwiMaster<SimBus, N>);

impl<const N: usize> DelayNs for IsrDelay<'_, N> {
    fn delay_ns(&mut self, _ns: u32) {
        fire_one(self.0);
    }
}

/// Time passes, nothing happens on the bus.
pub struct StuckDelay {
    pub waited_us: u32,
}

impl DelayNs for StuckDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waited_us += ns / 1_000;
    }
}
