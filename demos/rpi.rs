//! Raspberry Pi demo
//!
//! # Connections
//!
//! - PIN1 = 3V3 = VCC
//! - PIN3 = BCM2 = SDA
//! - PIN5 = BCM3 = SCL
//! - PIN6 = GND = GND
//!
//! AD0 tied low (device at 0x68), magnetometer reached through the bypass.

extern crate linux_embedded_hal as linux_hal;
extern crate mpu9x50;

use std::cell::Cell;
use std::thread;
use std::time::Duration;

use linux_hal::I2cdev;
use mpu9x50::{BlockingBus, Completion, Mpu9x50, Status, MPU_I2C_ADDR,
              WHO_AM_I_VALUE};

/// Latches the completion status for the pump loop to pick up.
struct Latch(Cell<Option<Status>>);

impl Latch {
    fn new() -> Self {
        Latch(Cell::new(None))
    }

    fn take(&self) -> Option<Status> {
        self.0.take()
    }
}

impl Completion for Latch {
    fn complete(&self, status: Status) {
        self.0.set(Some(status));
    }
}

/// Feeds parked completions into the driver until the handler fires.
fn run(bus: &mut BlockingBus<I2cdev>, mpu: &mut Mpu9x50, latch: &Latch)
       -> Status {
    loop {
        if let Some((status, data, len)) = bus.take_completion() {
            mpu.transfer_complete(bus, status, &data[..len]);
        }
        if let Some(status) = latch.take() {
            return status;
        }
    }
}

fn main() {
    let i2c = I2cdev::new("/dev/i2c-1").unwrap();
    let mut bus = BlockingBus::new(i2c);

    let latch = Latch::new();
    let mut mpu = Mpu9x50::new(MPU_I2C_ADDR);

    mpu.init(&mut bus, &latch).unwrap();
    assert_eq!(run(&mut bus, &mut mpu, &latch), Status::Success);

    mpu.read(&mut bus, 0x75, 1, &latch).unwrap();
    assert_eq!(run(&mut bus, &mut mpu, &latch), Status::Success);
    let who_am_i = mpu.read_result()[0];
    println!("WHO_AM_I: 0x{:x}", who_am_i);
    assert_eq!(who_am_i, WHO_AM_I_VALUE);

    loop {
        mpu.data_read(&mut bus, &latch).unwrap();
        if run(&mut bus, &mut mpu, &latch) != Status::Success {
            println!("burst read failed, retrying");
            continue;
        }
        println!("accel (g):   {:?}", mpu.accel());
        println!("gyro (dps):  {:?}", mpu.gyro());
        println!("mag (uT):    {:?}", mpu.mag());
        println!("temp (C):    {:.2}", mpu.temp());

        thread::sleep(Duration::from_millis(100));
    }
}
