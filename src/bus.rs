//! The bus transaction engine seam.
//!
//! The driver is written against [`BusEngine`], a non-blocking two-wire
//! master: `start_*` either rejects the transfer synchronously or kicks
//! it off and returns immediately, and the platform signals the eventual
//! outcome by calling the driver's `transfer_complete`. How the
//! completion travels from the hardware to that call (interrupt handler,
//! poll loop, task queue) is the integration layer's business; the only
//! contract is one completion per started transfer, delivered in order,
//! never concurrently with a submission on the same device.

use hal::blocking::i2c;

use {Error, Status, BUF_LEN};

/// A non-blocking bus transaction engine.
///
/// Implementations own their staging memory: `start_write` must copy
/// `data` out before returning, and read results are handed to the
/// driver as a byte slice alongside the completion.
pub trait BusEngine {
    /// Begins a read of `len` bytes from register `reg` of the device at
    /// `addr`. An `Err` means the transfer was never started.
    fn start_read(&mut self, addr: u8, reg: u8, len: usize)
                  -> Result<(), Error>;

    /// Begins a write of `data` to consecutive registers starting at
    /// `reg` of the device at `addr`.
    fn start_write(&mut self, addr: u8, reg: u8, data: &[u8])
                   -> Result<(), Error>;
}

/// Adapter running the driver over a blocking embedded-hal I2C
/// peripheral.
///
/// Each transfer completes synchronously inside `start_*`; the result is
/// parked until the integration loop collects it with
/// [`take_completion`](BlockingBus::take_completion) and feeds it to the
/// driver. Useful for bring-up and for hosts without an interrupt-driven
/// bus:
///
/// ```ignore
/// let mut bus = BlockingBus::new(i2cdev);
/// let mut mpu = Mpu9x50::new(MPU_I2C_ADDR);
/// mpu.init(&mut bus, &handler)?;
/// while let Some((status, data, len)) = bus.take_completion() {
///     mpu.transfer_complete(&mut bus, status, &data[..len]);
/// }
/// ```
pub struct BlockingBus<I2C> {
    i2c: I2C,
    pending: Option<(Status, [u8; BUF_LEN], usize)>,
}

impl<I2C, E> BlockingBus<I2C>
    where I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>
{
    /// Wraps a blocking I2C peripheral.
    pub fn new(i2c: I2C) -> Self {
        BlockingBus { i2c,
                      pending: None }
    }

    /// Takes the parked completion of the most recently started
    /// transfer, if any: status, received bytes, byte count (zero for
    /// writes and failures).
    pub fn take_completion(&mut self) -> Option<(Status, [u8; BUF_LEN], usize)> {
        self.pending.take()
    }

    /// Destroys the adapter, recovering the I2C peripheral.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> BusEngine for BlockingBus<I2C>
    where I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>
{
    fn start_read(&mut self, addr: u8, reg: u8, len: usize)
                  -> Result<(), Error> {
        if len > BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut buf = [0; BUF_LEN];
        self.pending = match self.i2c.write_read(addr, &[reg], &mut buf[..len])
        {
            Ok(()) => Some((Status::Success, buf, len)),
            Err(_) => Some((Status::Failure, buf, 0)),
        };
        Ok(())
    }

    fn start_write(&mut self, addr: u8, reg: u8, data: &[u8])
                   -> Result<(), Error> {
        if data.len() > BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut message = [0; BUF_LEN + 1];
        message[0] = reg;
        message[1..data.len() + 1].copy_from_slice(data);
        self.pending = match self.i2c.write(addr, &message[..data.len() + 1]) {
            Ok(()) => Some((Status::Success, [0; BUF_LEN], 0)),
            Err(_) => Some((Status::Failure, [0; BUF_LEN], 0)),
        };
        Ok(())
    }
}
