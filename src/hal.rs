use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::{error::TwiError, hardware::TwiHardware, master::TwiMaster, Address};

/// Blocking `embedded-hal` I2C bus on top of a [`TwiMaster`].
///
/// Waits by spinning on the engine state, so the TWI interrupt has to be
/// live while a transaction runs.
pub struct BlockingTwi<'a, H, const N: usize> {
    master: &'a TwiMaster<H, N>,
}

impl<'a, H: TwiHardware, const N: usize> BlockingTwi<'a, H, N> {
    pub fn new(master: &'a TwiMaster<H, N>) -> Self {
        Self { master }
    }

    fn run(&self, address: Address, operations: &mut [Operation<'_>]) -> Result<(), TwiError> {
        let mut rest = operations;
        let mut started = false;

        // Empty reads move no data and do not split the writes around them.
        while let Some(reading) = rest.iter().find_map(direction) {
            let len = rest
                .iter()
                .take_while(|op| direction(op) != Some(!reading))
                .count();
            let (group, tail) = core::mem::take(&mut rest).split_at_mut(len);
            rest = tail;

            let total: usize = group
                .iter()
                .map(|op| match op {
                    Operation::Read(buf) => buf.len(),
                    Operation::Write(_) => 0,
                })
                .sum();
            // Checked before the bus is touched, the engine would leave the
            // START pending.
            if reading && total > N {
                return Err(TwiError::BufferSize);
            }

            if started {
                self.master.send_repeated_start()?;
            } else {
                self.master.send_start()?;
                started = true;
            }

            if reading {
                self.read_group(address, group, total)?;
            } else {
                self.write_group(address, group)?;
            }
        }

        self.master.send_stop();
        Ok(())
    }

    /// Adjacent writes go out as one write, in buffer-sized chunks.
    fn write_group(&self, address: Address, group: &[Operation<'_>]) -> Result<(), TwiError> {
        let chunk_size = N.max(1);
        let mut addressed = false;

        for op in group {
            let Operation::Write(bytes) = op else {
                continue;
            };

            for chunk in bytes.chunks(chunk_size) {
                if addressed {
                    self.finish()?;
                    self.master.write(chunk)?;
                } else {
                    self.master.write_to(address, chunk)?;
                    addressed = true;
                }
            }
        }

        if !addressed {
            self.master.write_to(address, &[])?;
        }

        self.finish()
    }

    /// Adjacent reads are fetched in one go and split afterwards.
    fn read_group(
        &self,
        address: Address,
        group: &mut [Operation<'_>],
        total: usize,
    ) -> Result<(), TwiError> {
        self.master.read_from(address, total)?;
        self.finish()?;

        for op in group {
            if let Operation::Read(buf) = op {
                if !buf.is_empty() {
                    self.master.read_buffer(buf)?;
                }
            }
        }

        Ok(())
    }

    fn finish(&self) -> Result<(), TwiError> {
        match TwiError::from_state(self.master.wait_until_not_busy()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// `Some(true)` for a read, `Some(false)` for a write, `None` for an empty read.
fn direction(op: &Operation<'_>) -> Option<bool> {
    match op {
        Operation::Read(buf) if buf.is_empty() => None,
        Operation::Read(_) => Some(true),
        Operation::Write(_) => Some(false),
    }
}

impl<H: TwiHardware, const N: usize> ErrorType for BlockingTwi<'_, H, N> {
    type Error = TwiError;
}

impl<H: TwiHardware, const N: usize> I2c<SevenBitAddress> for BlockingTwi<'_, H, N> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.run(address, operations);
        if result.is_err() {
            debug!("twi: transaction with {=u8:#x} failed", address);
            // Error states are idle already, this only matters for rejected
            // requests in the middle of a transaction.
            self.master.send_stop();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{self, Op, DEVICE};

    #[test]
    fn write_read_round_trip() {
        let master = sim::master::<8>();
        let mut twi = BlockingTwi::new(&master);

        let mut out = [0u8; 3];
        sim::with_isr(&master, || twi.write_read(DEVICE, &[7, 8, 9], &mut out)).unwrap();

        assert_eq!(out, [7, 8, 9]);
        assert!(master.is_ok());
        master.with_hardware(|bus| {
            assert_eq!(bus.count(Op::Start), 1);
            assert_eq!(bus.count(Op::RepeatedStart), 1);
            assert_eq!(bus.count(Op::Stop), 1);
        });
    }

    #[test]
    fn adjacent_reads_are_one_read() {
        let master = sim::master::<8>();
        master.with_hardware(|bus| bus.memory.extend([1, 2, 3, 4, 5]));
        let mut twi = BlockingTwi::new(&master);

        let mut head = [0u8; 2];
        let mut tail = [0u8; 3];
        sim::with_isr(&master, || {
            twi.transaction(
                DEVICE,
                &mut [Operation::Read(&mut head), Operation::Read(&mut tail)],
            )
        })
        .unwrap();

        assert_eq!(head, [1, 2]);
        assert_eq!(tail, [3, 4, 5]);
        master.with_hardware(|bus| {
            assert_eq!(bus.transmitted(), [(DEVICE << 1) | 1]);
            assert_eq!(bus.count(Op::ReceiveNack), 1);
        });
    }

    #[test]
    fn long_writes_are_chunked() {
        let master = sim::master::<4>();
        let mut twi = BlockingTwi::new(&master);

        let bytes: Vec<u8> = (0..10).collect();
        sim::with_isr(&master, || twi.write(DEVICE, &bytes)).unwrap();

        master.with_hardware(|bus| {
            let mut expected = vec![DEVICE << 1];
            expected.extend_from_slice(&bytes);
            assert_eq!(bus.transmitted(), expected);
            assert_eq!(bus.count(Op::Start), 1);
            assert_eq!(bus.count(Op::RepeatedStart), 0);
        });
    }

    #[test]
    fn missing_device_is_an_address_nack() {
        let master = sim::master::<4>();
        master.with_hardware(|bus| bus.device = None);
        let mut twi = BlockingTwi::new(&master);

        let res = sim::with_isr(&master, || twi.write(DEVICE, &[1]));
        assert_eq!(res, Err(TwiError::NoResponse));

        // The next transaction starts over.
        master.with_hardware(|bus| bus.device = Some(DEVICE));
        sim::with_isr(&master, || twi.write(DEVICE, &[1])).unwrap();
    }

    #[test]
    fn oversized_read_fails_and_releases_the_bus() {
        let master = sim::master::<4>();
        let mut twi = BlockingTwi::new(&master);

        let mut out = [0u8; 5];
        let res = sim::with_isr(&master, || twi.read(DEVICE, &mut out));

        assert_eq!(res, Err(TwiError::BufferSize));
        assert!(master.is_ok());
        master.with_hardware(|bus| {
            assert_eq!(bus.count(Op::Start), 0);
            assert_eq!(bus.count(Op::Stop), 0);
        });
    }

    #[test]
    fn oversized_read_after_a_write_releases_the_bus() {
        let master = sim::master::<4>();
        let mut twi = BlockingTwi::new(&master);

        let mut out = [0u8; 5];
        let res = sim::with_isr(&master, || twi.write_read(DEVICE, &[1], &mut out));

        assert_eq!(res, Err(TwiError::BufferSize));
        assert!(master.is_ok());
        master.with_hardware(|bus| {
            assert_eq!(bus.transmitted(), [DEVICE << 1, 1]);
            assert_eq!(bus.count(Op::RepeatedStart), 0);
            assert_eq!(bus.count(Op::Stop), 1);
        });
    }

    #[test]
    fn empty_read_between_writes_keeps_one_write() {
        let master = sim::master::<4>();
        let mut twi = BlockingTwi::new(&master);

        sim::with_isr(&master, || {
            twi.transaction(
                DEVICE,
                &mut [
                    Operation::Write(&[1]),
                    Operation::Read(&mut []),
                    Operation::Write(&[2]),
                ],
            )
        })
        .unwrap();

        master.with_hardware(|bus| {
            assert_eq!(bus.transmitted(), [DEVICE << 1, 1, 2]);
            assert_eq!(bus.count(Op::Start), 1);
            assert_eq!(bus.count(Op::RepeatedStart), 0);
        });
    }

    #[test]
    fn empty_reads_are_skipped() {
        let master = sim::master::<4>();
        let mut twi = BlockingTwi::new(&master);

        twi.read(DEVICE, &mut []).unwrap();

        master.with_hardware(|bus| assert!(bus.ops.iter().all(|op| *op != Op::Start)));
    }
}
