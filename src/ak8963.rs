//! AK8963, the I2C magnetometer living behind the MPU9X50's bypass.
//!
//! The sub-driver has the same shape as the parent: operations are
//! submitted with a [`Completion`] handler, rejected while busy, and
//! advanced by feeding bus completions into
//! [`Ak8963::transfer_complete`]. When the parent chains a magnetometer
//! stage (init, the nine-axis burst) it forwards its own bus completions
//! here and consumes the returned terminal status instead of registering
//! a handler.

use cast::u16;

use bus::BusEngine;
use conf::MagScale;
use vec3::{Scale, Vec3};
use {Completion, Error, Status};

/// AK8963's I2C slave address (CAD1/CAD0 low)
pub const I2C_ADDRESS: u8 = 0x0c;

/// Expected contents of the WIA identity register
pub const WIA_VALUE: u8 = 0x48;

/// Transaction buffer capacity of the sub-driver
pub const MAG_BUF_LEN: usize = 8;

/// Highest register address on the AK8963
const REG_MAX: u8 = 0x12;

/// HXL through ST2; ST2 must be read to unlatch the next sample
const DATA_READ_LEN: usize = 7;

const SAMPLE_LEN: usize = 6;

// CNTL2: soft reset
const SOFT_RESET: u8 = 0x01;

// CNTL1: continuous measurement mode 2 (100 Hz), 16-bit output
const CONTINUOUS_16BIT: u8 = 0x16;

#[allow(dead_code)]
#[derive(Clone, Copy)]
enum Register {
    Wia = 0x00,
    St1 = 0x02,
    Hxl = 0x03,
    St2 = 0x09,
    Cntl1 = 0x0a,
    Cntl2 = 0x0b,
    Asax = 0x10,
}

impl Register {
    fn addr(&self) -> u8 {
        *self as u8
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Init: identity read in flight
    InitWia,
    /// Init: soft reset in flight
    InitReset,
    /// Init: measurement mode select in flight
    InitMode,
    ReadReg,
    WriteReg,
    /// Sample read (HXL..ST2) in flight
    ReadData,
}

/// AK8963 driver instance.
///
/// Owned by a [`Mpu9x50`](::Mpu9x50) but independently addressable: the
/// bypass puts the magnetometer directly on the shared bus, so callers
/// may drive it with its own submit/callback contract.
pub struct Ak8963<'a> {
    addr: u8,
    state: State,
    buf: [u8; MAG_BUF_LEN],
    read_len: usize,
    /// Last successfully read sample, wire order (little-endian words)
    sample: [u8; SAMPLE_LEN],
    scale: MagScale,
    scale_new: MagScale,
    handler: Option<&'a dyn Completion>,
}

impl<'a> Ak8963<'a> {
    /// Creates a sub-driver instance for a magnetometer at `addr`.
    pub fn new(addr: u8) -> Self {
        Ak8963 { addr,
                 state: State::Idle,
                 buf: [0; MAG_BUF_LEN],
                 read_len: 0,
                 sample: [0; SAMPLE_LEN],
                 scale: MagScale::default(),
                 scale_new: MagScale::default(),
                 handler: None }
    }

    /// Whether an operation is currently in flight.
    pub fn busy(&self) -> bool {
        self.state != State::Idle
    }

    /// The committed output resolution, selected by the last successful
    /// measurement-mode write.
    pub fn scale(&self) -> MagScale {
        self.scale
    }

    /// Initializes the magnetometer: identity check, soft reset, then
    /// continuous 16-bit measurement at 100 Hz.
    pub fn init<B>(&mut self,
                   bus: &mut B,
                   handler: &'a dyn Completion)
                   -> Result<(), Error>
        where B: BusEngine
    {
        self.start_init(bus)?;
        self.handler = Some(handler);
        Ok(())
    }

    /// Reads `count` bytes starting at `reg`; the bytes are available
    /// from [`read_result`](Ak8963::read_result) after a success
    /// completion.
    pub fn read<B>(&mut self,
                   bus: &mut B,
                   reg: u8,
                   count: usize,
                   handler: &'a dyn Completion)
                   -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        if reg > REG_MAX || count == 0 || count > MAG_BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        bus.start_read(self.addr, reg, count)?;
        self.state = State::ReadReg;
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Writes `data` starting at `reg`.
    pub fn write<B>(&mut self,
                    bus: &mut B,
                    reg: u8,
                    data: &[u8],
                    handler: &'a dyn Completion)
                    -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        if reg > REG_MAX || data.is_empty() || data.len() > MAG_BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        bus.start_write(self.addr, reg, data)?;
        // the mode register selects the output bit width
        if reg == Register::Cntl1.addr() {
            self.scale_new = MagScale::from_cntl1(data[0]);
        }
        self.state = State::WriteReg;
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Starts a sample read of all three axes.
    pub fn data_read<B>(&mut self,
                        bus: &mut B,
                        handler: &'a dyn Completion)
                        -> Result<(), Error>
        where B: BusEngine
    {
        self.start_data_read(bus)?;
        self.handler = Some(handler);
        Ok(())
    }

    /// Advances the sub-driver's state machine with a bus completion.
    ///
    /// Returns the terminal status when the in-flight operation finished
    /// with this event, `None` while stages remain. The registered
    /// handler, if any, fires exactly once alongside the `Some` return.
    pub fn transfer_complete<B>(&mut self,
                                bus: &mut B,
                                status: Status,
                                data: &[u8])
                                -> Option<Status>
        where B: BusEngine
    {
        if status == Status::Failure {
            return match self.state {
                State::Idle => None,
                _ => self.finish(Status::Failure),
            };
        }

        match self.state {
            State::Idle => None,
            State::InitWia => {
                if data.first() == Some(&WIA_VALUE) {
                    self.step(bus, State::InitReset, Register::Cntl2,
                              SOFT_RESET)
                } else {
                    self.finish(Status::Failure)
                }
            },
            State::InitReset => {
                self.step(bus, State::InitMode, Register::Cntl1,
                          CONTINUOUS_16BIT)
            },
            State::InitMode => {
                self.scale = self.scale_new;
                self.finish(Status::Success)
            },
            State::ReadReg => {
                let n = core::cmp::min(self.buf.len(), data.len());
                self.buf[..n].copy_from_slice(&data[..n]);
                self.read_len = n;
                self.finish(Status::Success)
            },
            State::WriteReg => {
                self.scale = self.scale_new;
                self.finish(Status::Success)
            },
            State::ReadData => {
                if data.len() < DATA_READ_LEN {
                    return self.finish(Status::Failure);
                }
                self.sample.copy_from_slice(&data[..SAMPLE_LEN]);
                self.finish(Status::Success)
            },
        }
    }

    /// The bytes received by the last completed register read.
    pub fn read_result(&self) -> &[u8] {
        &self.buf[..self.read_len]
    }

    /// Raw measurements from the last completed sample read.
    pub fn raw(&self) -> Vec3<i16> {
        Vec3 { x: self.word(0),
               y: self.word(2),
               z: self.word(4) }
    }

    /// Measurements in microtesla, scaled by the committed resolution.
    pub fn field(&self) -> Vec3<f32> {
        self.raw().f32().scale(self.scale.resolution())
    }

    /// First stage of init, without registering a handler. Used by the
    /// parent when chaining the bring-up behind its own init sequence.
    pub(crate) fn start_init<B>(&mut self, bus: &mut B) -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        bus.start_read(self.addr, Register::Wia.addr(), 1)?;
        self.state = State::InitWia;
        self.read_len = 0;
        self.scale_new = MagScale::from_cntl1(CONTINUOUS_16BIT);
        Ok(())
    }

    /// Starts a sample read without registering a handler; the parent
    /// chains this behind the main-die burst.
    pub(crate) fn start_data_read<B>(&mut self,
                                     bus: &mut B)
                                     -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        bus.start_read(self.addr, Register::Hxl.addr(), DATA_READ_LEN)?;
        self.state = State::ReadData;
        self.read_len = 0;
        Ok(())
    }

    /// The last sample in wire order, for the parent's snapshot.
    pub(crate) fn sample(&self) -> [u8; SAMPLE_LEN] {
        self.sample
    }

    fn step<B>(&mut self,
               bus: &mut B,
               next: State,
               reg: Register,
               value: u8)
               -> Option<Status>
        where B: BusEngine
    {
        match bus.start_write(self.addr, reg.addr(), &[value]) {
            Ok(()) => {
                self.state = next;
                None
            },
            Err(_) => self.finish(Status::Failure),
        }
    }

    fn finish(&mut self, status: Status) -> Option<Status> {
        if status == Status::Failure {
            self.scale_new = self.scale;
        }
        self.state = State::Idle;
        if let Some(handler) = self.handler.take() {
            handler.complete(status);
        }
        Some(status)
    }

    /// Little-endian signed word at a fixed sample offset.
    fn word(&self, offset: usize) -> i16 {
        ((u16(self.sample[offset + 1]) << 8) + u16(self.sample[offset]))
        as i16
    }
}
