//! A scripted bus engine for driving the state machine on the host.

use std::cell::RefCell;
use std::collections::HashMap;

use mpu9x50::{BusEngine, Completion, Error, Mpu9x50, Status, BUF_LEN};

/// One transfer as seen by the engine, for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Xfer {
    Read { addr: u8, reg: u8, len: usize },
    Write { addr: u8, reg: u8, data: Vec<u8> },
}

/// Fake bus engine backed by a register file per device address.
///
/// Every `start_*` is logged and completes "later": the outcome is
/// parked until the test pumps it into the driver, which mirrors how a
/// real interrupt-driven engine delivers completions.
pub struct FakeBus {
    regs: HashMap<(u8, u8), u8>,
    pub log: Vec<Xfer>,
    /// Fail the next started transfer (hardware error at completion)
    pub fail_next: bool,
    /// Reject the next transfer synchronously (never started)
    pub reject_next: bool,
    pending: Option<(Status, [u8; BUF_LEN], usize)>,
}

impl FakeBus {
    pub fn new() -> Self {
        FakeBus { regs: HashMap::new(),
                  log: Vec::new(),
                  fail_next: false,
                  reject_next: false,
                  pending: None }
    }

    pub fn set(&mut self, addr: u8, reg: u8, value: u8) {
        self.regs.insert((addr, reg), value);
    }

    pub fn set_block(&mut self, addr: u8, reg: u8, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.set(addr, reg + i as u8, b);
        }
    }

    pub fn get(&self, addr: u8, reg: u8) -> u8 {
        *self.regs.get(&(addr, reg)).unwrap_or(&0)
    }

    pub fn pop(&mut self) -> Option<(Status, [u8; BUF_LEN], usize)> {
        self.pending.take()
    }
}

impl BusEngine for FakeBus {
    fn start_read(&mut self, addr: u8, reg: u8, len: usize)
                  -> Result<(), Error> {
        if self.reject_next {
            self.reject_next = false;
            return Err(Error::BusFailure);
        }
        self.log.push(Xfer::Read { addr, reg, len });
        let mut buf = [0; BUF_LEN];
        if self.fail_next {
            self.fail_next = false;
            self.pending = Some((Status::Failure, buf, 0));
            return Ok(());
        }
        for i in 0..len {
            buf[i] = self.get(addr, reg + i as u8);
        }
        self.pending = Some((Status::Success, buf, len));
        Ok(())
    }

    fn start_write(&mut self, addr: u8, reg: u8, data: &[u8])
                   -> Result<(), Error> {
        if self.reject_next {
            self.reject_next = false;
            return Err(Error::BusFailure);
        }
        self.log.push(Xfer::Write { addr,
                                    reg,
                                    data: data.to_vec() });
        if self.fail_next {
            self.fail_next = false;
            self.pending = Some((Status::Failure, [0; BUF_LEN], 0));
            return Ok(());
        }
        for (i, &b) in data.iter().enumerate() {
            self.set(addr, reg + i as u8, b);
        }
        self.pending = Some((Status::Success, [0; BUF_LEN], 0));
        Ok(())
    }
}

/// Feeds parked completions back into the device until the bus goes
/// quiet, the way an interrupt loop would.
pub fn pump(bus: &mut FakeBus, dev: &mut Mpu9x50) {
    while let Some((status, data, len)) = bus.pop() {
        dev.transfer_complete(bus, status, &data[..len]);
    }
}

/// Same as [`pump`], but routes completions to the magnetometer
/// sub-driver for directly submitted operations.
pub fn pump_mag(bus: &mut FakeBus, dev: &mut Mpu9x50) {
    while let Some((status, data, len)) = bus.pop() {
        dev.ak8963_mut().transfer_complete(bus, status, &data[..len]);
    }
}

/// Records every completion callback it receives.
pub struct Spy {
    completions: RefCell<Vec<Status>>,
}

impl Spy {
    pub fn new() -> Self {
        Spy { completions: RefCell::new(Vec::new()) }
    }

    pub fn count(&self) -> usize {
        self.completions.borrow().len()
    }

    pub fn last(&self) -> Option<Status> {
        self.completions.borrow().last().cloned()
    }
}

impl Completion for Spy {
    fn complete(&self, status: Status) {
        self.completions.borrow_mut().push(status);
    }
}
