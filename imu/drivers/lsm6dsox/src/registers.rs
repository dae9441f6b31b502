use bitflags::bitflags;

pub const GRAVITY: f32 = 9.80665;

#[derive(Debug, Clone, Copy)]
pub enum Constants {
    Lsm6dsoxI2cAddr = 0x6A,
    Lsm6dsoxChipId = 0x6C,
    Lis3mdlI2cAddr = 0x1C,
    Lis3mdlChipId = 0x3D,
}

#[derive(Debug, Clone, Copy)]
pub enum Lsm6dsoxRegisters {
    WhoAmI = 0x0F,
    Ctrl1Xl = 0x10,
    Ctrl2G = 0x11,
    Ctrl3C = 0x12,
    Status = 0x1E,
    OutxLG = 0x22,
    OutxLA = 0x28,
}

#[derive(Debug, Clone, Copy)]
pub enum Lis3mdlRegisters {
    WhoAmI = 0x0F,
    CtrlReg1 = 0x20,
    CtrlReg2 = 0x21,
    CtrlReg3 = 0x22,
    CtrlReg4 = 0x23,
    Status = 0x27,
    OutXL = 0x28,
}

/// Sub-address bit enabling register auto-increment on LIS3MDL I2C reads.
pub const LIS3MDL_AUTO_INCREMENT: u8 = 0x80;

/// Output data rate codes (upper nibble of CTRL1_XL / CTRL2_G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Hz12_5 = 0b0001,
    Hz26 = 0b0010,
    Hz52 = 0b0011,
    Hz104 = 0b0100,
    Hz208 = 0b0101,
    Hz416 = 0b0110,
    Hz833 = 0b0111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    G2 = 0b00,
    G16 = 0b01,
    G4 = 0b10,
    G8 = 0b11,
}

impl AccelRange {
    /// m/s² per LSB.
    pub fn scale(&self) -> f32 {
        let mg_per_lsb = match self {
            AccelRange::G2 => 0.061,
            AccelRange::G4 => 0.122,
            AccelRange::G8 => 0.244,
            AccelRange::G16 => 0.488,
        };
        mg_per_lsb / 1000.0 * GRAVITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps250 = 0b00,
    Dps500 = 0b01,
    Dps1000 = 0b10,
    Dps2000 = 0b11,
}

impl GyroRange {
    /// deg/s per LSB.
    pub fn scale(&self) -> f32 {
        let mdps_per_lsb = match self {
            GyroRange::Dps250 => 8.75,
            GyroRange::Dps500 => 17.5,
            GyroRange::Dps1000 => 35.0,
            GyroRange::Dps2000 => 70.0,
        };
        mdps_per_lsb / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagRange {
    Gauss4 = 0b00,
    Gauss8 = 0b01,
    Gauss12 = 0b10,
    Gauss16 = 0b11,
}

impl MagRange {
    /// µT per LSB (1 gauss = 100 µT).
    pub fn scale(&self) -> f32 {
        let lsb_per_gauss = match self {
            MagRange::Gauss4 => 6842.0,
            MagRange::Gauss8 => 3421.0,
            MagRange::Gauss12 => 2281.0,
            MagRange::Gauss16 => 1711.0,
        };
        100.0 / lsb_per_gauss
    }
}

/// LIS3MDL operating mode for the X/Y and Z axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceMode {
    LowPower = 0b00,
    Medium = 0b01,
    High = 0b10,
    UltraHigh = 0b11,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lsm6dsoxStatus: u8 {
        const ACCEL_READY = 0b0000_0001;
        const GYRO_READY = 0b0000_0010;
        const TEMP_READY = 0b0000_0100;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lis3mdlStatus: u8 {
        const X_READY = 0b0000_0001;
        const Y_READY = 0b0000_0010;
        const Z_READY = 0b0000_0100;
        const XYZ_READY = 0b0000_1000;
        const X_OVERRUN = 0b0001_0000;
        const Y_OVERRUN = 0b0010_0000;
        const Z_OVERRUN = 0b0100_0000;
        const XYZ_OVERRUN = 0b1000_0000;
    }
}

pub const CTRL3_C_SW_RESET: u8 = 0b0000_0001;
pub const CTRL3_C_IF_INC: u8 = 0b0000_0100;
pub const CTRL3_C_BDU: u8 = 0b0100_0000;

pub const LIS3MDL_FAST_ODR: u8 = 0b0000_0010;
pub const LIS3MDL_CONTINUOUS: u8 = 0b00;
