//! A no_std, non-blocking driver for the MPU9150/MPU9250
//! (accelerometer + gyroscope + magnetometer IMU) and its onboard AK8963.
//!
//! The driver never blocks the caller: every operation is submitted to a
//! [`BusEngine`], control returns immediately, and the outcome is reported
//! exactly once through a registered [`Completion`] handler after the
//! integration layer feeds the engine's completion back into
//! [`Mpu9x50::transfer_complete`]. Multi-stage operations (initialization,
//! read-modify-write, the nine-axis burst read) are sequenced by an
//! internal state machine; at most one operation is in flight per device
//! instance and further submissions are rejected with [`Error::Busy`].
//!
//! Typical integration:
//!
//! 1. submit an operation with a completion handler;
//! 2. when the bus engine signals the end of a transfer (from an
//!    interrupt handler or a poll loop), call `transfer_complete` with the
//!    status and any received bytes;
//! 3. repeat until the handler fires, then read results via the raw/float
//!    accessors.

#![deny(missing_docs)]
#![no_std]

extern crate cast;
extern crate embedded_hal as hal;
#[macro_use]
extern crate bitflags;

pub mod ak8963;
pub mod bus;
pub mod conf;
pub mod vec3;

use cast::{f32, u16};

pub use ak8963::Ak8963;
pub use bus::{BlockingBus, BusEngine};
pub use conf::{AccelScale, GyroScale, InterruptConfig, MagScale};
pub use vec3::{Scale, Vec3};

/// MPU's I2C address (AD0 low)
pub const MPU_I2C_ADDR: u8 = 0x68;

/// Expected contents of the WHO_AM_I register (MPU9250)
pub const WHO_AM_I_VALUE: u8 = 0x71;

/// Transaction buffer capacity: the largest supported burst, spanning the
/// accelerometer, temperature, gyroscope and magnetometer output registers.
pub const BUF_LEN: usize = 24;

/// Highest register address accepted by the register access operations
const REG_MAX: u8 = 0x7e;

/// Length of the main-die portion of the burst (accel + temp + gyro)
const MPU_DATA_LEN: usize = 14;

/// Length of the committed nine-axis snapshot (main burst + magnetometer)
const SNAPSHOT_LEN: usize = MPU_DATA_LEN + 6;

// PWR_MGMT_1 values
const DEVICE_RESET: u8 = 0x80;
const CLOCK_PLL: u8 = 0x01;

// AFS_SEL / FS_SEL field in ACCEL_CONFIG / GYRO_CONFIG
const FS_SEL_MASK: u8 = 0b0001_1000;
const FS_SEL_SHIFT: u8 = 3;

/// Temperature sensor sensitivity, LSB per degree Celsius
const TEMP_SENSITIVITY: f32 = 333.87;

/// Final status of an operation or of a single bus transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The transfer (or the whole operation) completed
    Success,
    /// The bus engine reported a failed transfer
    Failure,
}

/// Errors detected synchronously at submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// An operation is already in flight on this instance
    Busy,
    /// Out-of-range register address or unsupported byte count
    InvalidArgument,
    /// The bus engine rejected the transfer outright
    BusFailure,
}

/// Completion notification for an accepted operation.
///
/// Invoked exactly once per accepted top-level operation, after its final
/// transfer stage finishes, possibly from interrupt context. Handlers only
/// get `&self`; implementations record the outcome in `Cell`s or forward
/// it through whatever primitive the platform offers, and resubmit from
/// task context.
pub trait Completion {
    /// Called with the final status of the operation.
    fn complete(&self, status: Status);
}

/// The stage of the in-flight operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    /// Init: device reset in flight
    InitReset,
    /// Init: clock source select in flight
    InitClock,
    /// Init: I2C bypass enable in flight
    InitBypass,
    /// Init: AK8963 bring-up, delegated to the sub-driver
    InitMag,
    /// Register read in flight
    ReadReg,
    /// Register write in flight
    WriteReg,
    /// Read stage of a read-modify-write
    RmwRead,
    /// Write stage of a read-modify-write
    RmwWrite,
    /// Main-die portion of the burst read in flight
    ReadData,
    /// Magnetometer stage of the burst read, delegated to the sub-driver
    ReadMag,
}

/// Bookkeeping for the in-flight operation. Exactly one operation is
/// active at a time, so the variants share storage; the current [`State`]
/// determines which one is valid.
enum Command {
    None,
    Read { len: usize },
    Write,
    Rmw { reg: u8, mask: u8, value: u8 },
}

/// MPU9X50 driver instance.
///
/// One instance per physical sensor; constructed once during bring-up and
/// then live for the rest of the process. The bus engine is shared, not
/// owned: it is lent to every submission and every `transfer_complete`
/// call, so a single engine can serve several devices.
pub struct Mpu9x50<'a> {
    /// The onboard magnetometer, reachable through the I2C bypass
    mag: Ak8963<'a>,
    addr: u8,
    state: State,
    command: Command,
    /// Reused transaction buffer; only meaningful while an operation is
    /// in flight or, after a register read, until the next submission
    buf: [u8; BUF_LEN],
    read_len: usize,
    /// Last successfully completed nine-axis burst, big-endian words
    snapshot: [u8; SNAPSHOT_LEN],
    accel_scale: AccelScale,
    accel_scale_new: AccelScale,
    gyro_scale: GyroScale,
    gyro_scale_new: GyroScale,
    handler: Option<&'a dyn Completion>,
}

impl<'a> Mpu9x50<'a> {
    /// Creates a driver instance for a device at the given bus address.
    ///
    /// No bus traffic happens here; call [`init`](Mpu9x50::init) next.
    pub fn new(addr: u8) -> Self {
        Mpu9x50 { mag: Ak8963::new(ak8963::I2C_ADDRESS),
                  addr,
                  state: State::Idle,
                  command: Command::None,
                  buf: [0; BUF_LEN],
                  read_len: 0,
                  snapshot: [0; SNAPSHOT_LEN],
                  accel_scale: AccelScale::default(),
                  accel_scale_new: AccelScale::default(),
                  gyro_scale: GyroScale::default(),
                  gyro_scale_new: GyroScale::default(),
                  handler: None }
    }

    /// Whether an operation is currently in flight.
    pub fn busy(&self) -> bool {
        self.state != State::Idle
    }

    /// Returns the nested AK8963 sub-driver.
    pub fn ak8963(&self) -> &Ak8963<'a> {
        &self.mag
    }

    /// Returns the nested AK8963 sub-driver for direct operations.
    ///
    /// Completions for directly submitted magnetometer operations must be
    /// fed to the sub-driver's own `transfer_complete`.
    pub fn ak8963_mut(&mut self) -> &mut Ak8963<'a> {
        &mut self.mag
    }

    /// Initializes the device: reset, clock source select, I2C bypass
    /// enable, then AK8963 bring-up chained through the sub-driver.
    ///
    /// XXX the datasheet asks for a settling delay after DEVICE_RESET;
    /// interrupt-driven engines are slow enough in practice, polled ones
    /// may need to space out the completions.
    pub fn init<B>(&mut self,
                   bus: &mut B,
                   handler: &'a dyn Completion)
                   -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle || self.mag.busy() {
            return Err(Error::Busy);
        }
        bus.start_write(self.addr, Register::PwrMgmt1.addr(), &[DEVICE_RESET])?;
        self.state = State::InitReset;
        self.command = Command::None;
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Reads `count` bytes starting at `reg` into the transaction buffer.
    ///
    /// On a success completion the bytes are available from
    /// [`read_result`](Mpu9x50::read_result) until the next submission.
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
        if reg > REG_MAX || count == 0 || count > BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        bus.start_read(self.addr, reg, count)?;
        self.state = State::ReadReg;
        self.command = Command::Read { len: count };
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Writes `data` starting at `reg`.
    ///
    /// The engine copies the bytes out before `start_write` returns, so
    /// the caller's slice need not outlive the call. Writes covering the
    /// full-scale fields of GYRO_CONFIG or ACCEL_CONFIG stage a new range
    /// which is committed only if the write completes successfully.
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
        if reg > REG_MAX || data.is_empty() || data.len() > BUF_LEN {
            return Err(Error::InvalidArgument);
        }
        bus.start_write(self.addr, reg, data)?;
        for (i, &value) in data.iter().enumerate() {
            match reg + i as u8 {
                r if r == Register::GyroConfig.addr() => {
                    self.gyro_scale_new =
                        GyroScale::from_fs_sel(value >> FS_SEL_SHIFT);
                },
                r if r == Register::AccelConfig.addr() => {
                    self.accel_scale_new =
                        AccelScale::from_fs_sel(value >> FS_SEL_SHIFT);
                },
                _ => {},
            }
        }
        self.state = State::WriteReg;
        self.command = Command::Write;
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Updates the bits of `reg` selected by `mask` to `value`: a read
    /// stage followed by a write of `(current & !mask) | (value & mask)`.
    /// The intermediate read result is never exposed; only the final
    /// write outcome is reported. Updates touching GYRO_CONFIG or
    /// ACCEL_CONFIG track the resulting full-scale range, committed only
    /// if the write stage succeeds.
    pub fn read_modify_write<B>(&mut self,
                                bus: &mut B,
                                reg: u8,
                                mask: u8,
                                value: u8,
                                handler: &'a dyn Completion)
                                -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        if reg > REG_MAX {
            return Err(Error::InvalidArgument);
        }
        bus.start_read(self.addr, reg, 1)?;
        self.state = State::RmwRead;
        self.command = Command::Rmw { reg, mask, value };
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Selects the accelerometer full-scale range.
    ///
    /// The range is committed, for use by [`accel`](Mpu9x50::accel),
    /// only when the underlying read-modify-write of ACCEL_CONFIG
    /// reports success.
    pub fn set_accel_scale<B>(&mut self,
                              bus: &mut B,
                              scale: AccelScale,
                              handler: &'a dyn Completion)
                              -> Result<(), Error>
        where B: BusEngine
    {
        self.read_modify_write(bus,
                               Register::AccelConfig.addr(),
                               FS_SEL_MASK,
                               scale.fs_sel() << FS_SEL_SHIFT,
                               handler)
    }

    /// Selects the gyroscope full-scale range; commit-on-success, as with
    /// [`set_accel_scale`](Mpu9x50::set_accel_scale).
    pub fn set_gyro_scale<B>(&mut self,
                             bus: &mut B,
                             scale: GyroScale,
                             handler: &'a dyn Completion)
                             -> Result<(), Error>
        where B: BusEngine
    {
        self.read_modify_write(bus,
                               Register::GyroConfig.addr(),
                               FS_SEL_MASK,
                               scale.fs_sel() << FS_SEL_SHIFT,
                               handler)
    }

    /// Starts the nine-axis burst read: one transfer spanning the
    /// accelerometer, temperature and gyroscope output registers, then a
    /// chained magnetometer read through the sub-driver. The committed
    /// snapshot read by the accessors is replaced only after the final
    /// stage succeeds.
    pub fn data_read<B>(&mut self,
                        bus: &mut B,
                        handler: &'a dyn Completion)
                        -> Result<(), Error>
        where B: BusEngine
    {
        if self.state != State::Idle || self.mag.busy() {
            return Err(Error::Busy);
        }
        bus.start_read(self.addr, Register::AccelXoutH.addr(), MPU_DATA_LEN)?;
        self.state = State::ReadData;
        self.command = Command::None;
        self.read_len = 0;
        self.handler = Some(handler);
        Ok(())
    }

    /// Advances the state machine with the outcome of the transfer most
    /// recently issued to the bus engine. `data` carries the received
    /// bytes of a read transfer and is empty for writes.
    ///
    /// Called by the integration layer whenever the engine signals
    /// completion; a call while idle is ignored.
    pub fn transfer_complete<B>(&mut self,
                                bus: &mut B,
                                status: Status,
                                data: &[u8])
        where B: BusEngine
    {
        // Delegated stages forward everything, failures included, so the
        // sub-driver's state machine unwinds as well.
        if self.state == State::InitMag || self.state == State::ReadMag {
            match self.mag.transfer_complete(bus, status, data) {
                Some(Status::Success) => {
                    if self.state == State::ReadMag {
                        self.commit_snapshot();
                    }
                    self.finish(Status::Success);
                },
                Some(Status::Failure) => self.finish(Status::Failure),
                None => {},
            }
            return;
        }

        if status == Status::Failure {
            if self.state != State::Idle {
                self.finish(Status::Failure);
            }
            return;
        }

        match self.state {
            State::Idle | State::InitMag | State::ReadMag => {},
            State::InitReset => {
                self.step(bus, State::InitClock, Register::PwrMgmt1, CLOCK_PLL)
            },
            State::InitClock => {
                let cfg = InterruptConfig::LATCH_INT_EN
                          | InterruptConfig::INT_ANYRD_CLEAR
                          | InterruptConfig::ACL
                          | InterruptConfig::BYPASS_EN;
                self.step(bus, State::InitBypass, Register::IntPinCfg,
                          cfg.bits())
            },
            State::InitBypass => match self.mag.start_init(bus) {
                Ok(()) => self.state = State::InitMag,
                Err(_) => self.finish(Status::Failure),
            },
            State::ReadReg => {
                let len = match self.command {
                    Command::Read { len } => len,
                    _ => 0,
                };
                let n = core::cmp::min(len, data.len());
                self.buf[..n].copy_from_slice(&data[..n]);
                self.read_len = n;
                self.finish(Status::Success);
            },
            State::WriteReg => {
                self.commit_scales();
                self.finish(Status::Success);
            },
            State::RmwRead => {
                let (reg, mask, value) = match self.command {
                    Command::Rmw { reg, mask, value } => (reg, mask, value),
                    _ => {
                        self.finish(Status::Failure);
                        return;
                    },
                };
                let current = match data.first() {
                    Some(&b) => b,
                    None => {
                        self.finish(Status::Failure);
                        return;
                    },
                };
                let merged = (current & !mask) | (value & mask);
                // the merged value is what the device will hold, even
                // when the mask covers the full-scale field only in part
                if reg == Register::GyroConfig.addr() {
                    self.gyro_scale_new =
                        GyroScale::from_fs_sel(merged >> FS_SEL_SHIFT);
                }
                if reg == Register::AccelConfig.addr() {
                    self.accel_scale_new =
                        AccelScale::from_fs_sel(merged >> FS_SEL_SHIFT);
                }
                match bus.start_write(self.addr, reg, &[merged]) {
                    Ok(()) => self.state = State::RmwWrite,
                    Err(_) => self.finish(Status::Failure),
                }
            },
            State::RmwWrite => {
                self.commit_scales();
                self.finish(Status::Success);
            },
            State::ReadData => {
                if data.len() < MPU_DATA_LEN {
                    self.finish(Status::Failure);
                    return;
                }
                self.buf[..MPU_DATA_LEN]
                    .copy_from_slice(&data[..MPU_DATA_LEN]);
                match self.mag.start_data_read(bus) {
                    Ok(()) => self.state = State::ReadMag,
                    Err(_) => self.finish(Status::Failure),
                }
            },
        }
    }

    /// The bytes received by the last completed register read.
    pub fn read_result(&self) -> &[u8] {
        &self.buf[..self.read_len]
    }

    /// Raw accelerometer measurements from the last completed burst.
    pub fn accel_raw(&self) -> Vec3<i16> {
        self.word3(0)
    }

    /// Accelerometer measurements in g, scaled by the committed range.
    pub fn accel(&self) -> Vec3<f32> {
        self.accel_raw().f32().scale(self.accel_scale.resolution())
    }

    /// Raw temperature measurement from the last completed burst.
    pub fn temp_raw(&self) -> i16 {
        self.word(6)
    }

    /// Die temperature in degrees Celsius.
    pub fn temp(&self) -> f32 {
        f32(self.temp_raw()) / TEMP_SENSITIVITY + 21.0
    }

    /// Raw gyroscope measurements from the last completed burst.
    pub fn gyro_raw(&self) -> Vec3<i16> {
        self.word3(8)
    }

    /// Gyroscope measurements in degrees per second, scaled by the
    /// committed range.
    pub fn gyro(&self) -> Vec3<f32> {
        self.gyro_raw().f32().scale(self.gyro_scale.resolution())
    }

    /// Raw magnetometer measurements from the last completed burst.
    pub fn mag_raw(&self) -> Vec3<i16> {
        self.word3(MPU_DATA_LEN)
    }

    /// Magnetometer measurements in microtesla.
    pub fn mag(&self) -> Vec3<f32> {
        self.mag_raw().f32().scale(self.mag.scale().resolution())
    }

    /// The committed accelerometer full-scale range.
    pub fn accel_scale(&self) -> AccelScale {
        self.accel_scale
    }

    /// The committed gyroscope full-scale range.
    pub fn gyro_scale(&self) -> GyroScale {
        self.gyro_scale
    }

    /// Issues the next single-byte write stage of the init sequence.
    fn step<B>(&mut self, bus: &mut B, next: State, reg: Register, value: u8)
        where B: BusEngine
    {
        match bus.start_write(self.addr, reg.addr(), &[value]) {
            Ok(()) => self.state = next,
            Err(_) => self.finish(Status::Failure),
        }
    }

    /// Terminal transition: back to idle, callback fired exactly once.
    /// On failure the staged ranges are rolled back so an unrelated later
    /// write cannot commit them.
    fn finish(&mut self, status: Status) {
        if status == Status::Failure {
            self.accel_scale_new = self.accel_scale;
            self.gyro_scale_new = self.gyro_scale;
        }
        self.state = State::Idle;
        self.command = Command::None;
        if let Some(handler) = self.handler.take() {
            handler.complete(status);
        }
    }

    /// Success side effect of a completed write stage.
    fn commit_scales(&mut self) {
        self.accel_scale = self.accel_scale_new;
        self.gyro_scale = self.gyro_scale_new;
    }

    /// Success side effect of the final burst stage: publish the main-die
    /// bytes and the magnetometer sample (normalized to big-endian) as
    /// the committed snapshot.
    fn commit_snapshot(&mut self) {
        self.snapshot[..MPU_DATA_LEN].copy_from_slice(&self.buf[..MPU_DATA_LEN]);
        let sample = self.mag.sample();
        for i in 0..3 {
            // the AK8963 is little-endian on the wire
            self.snapshot[MPU_DATA_LEN + 2 * i] = sample[2 * i + 1];
            self.snapshot[MPU_DATA_LEN + 2 * i + 1] = sample[2 * i];
        }
    }

    /// Big-endian signed word at a fixed snapshot offset.
    fn word(&self, offset: usize) -> i16 {
        ((u16(self.snapshot[offset]) << 8) + u16(self.snapshot[offset + 1]))
        as i16
    }

    fn word3(&self, offset: usize) -> Vec3<i16> {
        Vec3 { x: self.word(offset),
               y: self.word(offset + 2),
               z: self.word(offset + 4) }
    }
}

#[allow(dead_code)]
#[derive(Clone, Copy)]
enum Register {
    SmplrtDiv = 0x19,
    Config = 0x1a,
    GyroConfig = 0x1b,
    AccelConfig = 0x1c,
    IntPinCfg = 0x37,
    IntEnable = 0x38,
    AccelXoutH = 0x3b,
    TempOutH = 0x41,
    GyroXoutH = 0x43,
    UserCtrl = 0x6a,
    PwrMgmt1 = 0x6b,
    PwrMgmt2 = 0x6c,
    WhoAmI = 0x75,
}

impl Register {
    fn addr(&self) -> u8 {
        *self as u8
    }
}
