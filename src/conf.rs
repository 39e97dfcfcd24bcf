//! Configuration for MPU9X50.

use core::default::Default;

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Accelerometer reading full scale configuration, default: +2g.
pub enum AccelScale {
    /// +2g
    _2G = 0,
    /// +4g
    _4G = 1,
    /// +8g
    _8G = 2,
    /// +16g
    _16G = 3,
}

impl AccelScale {
    /// g per LSB for this range
    pub fn resolution(&self) -> f32 {
        match self {
            AccelScale::_2G => 2.0 / 32768.0,
            AccelScale::_4G => 4.0 / 32768.0,
            AccelScale::_8G => 8.0 / 32768.0,
            AccelScale::_16G => 16.0 / 32768.0,
        }
    }

    pub(crate) fn fs_sel(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn from_fs_sel(bits: u8) -> Self {
        match bits & 0b11 {
            0 => AccelScale::_2G,
            1 => AccelScale::_4G,
            2 => AccelScale::_8G,
            _ => AccelScale::_16G,
        }
    }
}

impl Default for AccelScale {
    fn default() -> Self {
        AccelScale::_2G
    }
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Gyroscope reading full scale configuration; default: +250 dps.
pub enum GyroScale {
    /// +250 dps
    _250DPS = 0,
    /// +500 dps
    _500DPS = 1,
    /// +1000 dps
    _1000DPS = 2,
    /// +2000 dps
    _2000DPS = 3,
}

impl GyroScale {
    /// degrees per second per LSB for this range
    pub fn resolution(&self) -> f32 {
        match self {
            GyroScale::_250DPS => 250.0 / 32768.0,
            GyroScale::_500DPS => 500.0 / 32768.0,
            GyroScale::_1000DPS => 1000.0 / 32768.0,
            GyroScale::_2000DPS => 2000.0 / 32768.0,
        }
    }

    pub(crate) fn fs_sel(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn from_fs_sel(bits: u8) -> Self {
        match bits & 0b11 {
            0 => GyroScale::_250DPS,
            1 => GyroScale::_500DPS,
            2 => GyroScale::_1000DPS,
            _ => GyroScale::_2000DPS,
        }
    }
}

impl Default for GyroScale {
    fn default() -> Self {
        GyroScale::_250DPS
    }
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Magnetometer output resolution, selected by the BIT flag of CNTL1;
/// default: 14 bits.
pub enum MagScale {
    /// 14-bit output, 0.6 µT per LSB
    _14BITS = 0,
    /// 16-bit output, 0.15 µT per LSB
    _16BITS,
}

impl MagScale {
    /// microtesla per LSB for this resolution (±4912 µT full scale)
    pub fn resolution(&self) -> f32 {
        match self {
            MagScale::_14BITS => 4912.0 / 8190.0,
            MagScale::_16BITS => 4912.0 / 32760.0,
        }
    }

    pub(crate) fn from_cntl1(value: u8) -> Self {
        if value & 0b0001_0000 != 0 {
            MagScale::_16BITS
        } else {
            MagScale::_14BITS
        }
    }
}

impl Default for MagScale {
    fn default() -> Self {
        MagScale::_14BITS
    }
}

bitflags! {
    /// Interrupt pin / bypass configuration (INT_PIN_CFG).
    /// Defaults:
    /// active high, push-pull, 50 us pulse, cleared only by reading INT_STATUS
    #[allow(non_camel_case_types)]
    pub struct InterruptConfig: u8 {
        /// Sets logic level for INT pin is active low (high if not set)
        const ACL = 0b1000_0000;
        /// INT pin is configured as open drain (push pull if not set)
        const OPEN = 0b0100_0000;
        /// INT pin level held until interrupt status is cleared (cleared within 50us if not set)
        const LATCH_INT_EN = 0b0010_0000;
        /// Interrupt status is cleared if any read operation is performed (cleared only by reading INT_STATUS if not set)
        const INT_ANYRD_CLEAR = 0b0001_0000;
        /// The logic level for the FSYNC pin as an interrupt is active low (active high if not set)
        const ACTL_FSYNC = 0b0000_1000;
        /// This enables the FSYNC pin to be used as an interrupt
        const FSYNC_INT_MODE_EN = 0b0000_0100;
        /// When asserted, the i2c_master interface pins (ES_CL and ES_DA) will
        /// go into 'bypass mode' when the i2c master interface is disabled
        const BYPASS_EN = 0b0000_0010;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_sel_round_trips() {
        for scale in [AccelScale::_2G,
                      AccelScale::_4G,
                      AccelScale::_8G,
                      AccelScale::_16G]
                      .iter()
        {
            assert_eq!(AccelScale::from_fs_sel(scale.fs_sel()), *scale);
        }
        for scale in [GyroScale::_250DPS,
                      GyroScale::_500DPS,
                      GyroScale::_1000DPS,
                      GyroScale::_2000DPS]
                      .iter()
        {
            assert_eq!(GyroScale::from_fs_sel(scale.fs_sel()), *scale);
        }
    }

    #[test]
    fn resolutions_match_full_scale() {
        assert_eq!(AccelScale::_2G.resolution() * 32768.0, 2.0);
        assert_eq!(GyroScale::_2000DPS.resolution() * 32768.0, 2000.0);
        // 16-bit mode resolves the +-4912 uT range over +-32760 counts
        assert!((MagScale::_16BITS.resolution() - 0.15).abs() < 0.01);
    }

    #[test]
    fn cntl1_bit_flag_selects_resolution() {
        assert_eq!(MagScale::from_cntl1(0x16), MagScale::_16BITS);
        assert_eq!(MagScale::from_cntl1(0x06), MagScale::_14BITS);
    }
}
