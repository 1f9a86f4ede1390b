//! Cached register map for the APDS-9960.
//!
//! The sensor exposes an 8-bit register file on the I2C bus. Most registers
//! hold configuration that only changes when the host writes it, so reads can
//! be served from a write-invalidated cache. The accumulator registers change
//! on every integration cycle (volatile) and the latched status registers
//! clear themselves when read (precious); both classes always go to the bus
//! and are never cached.

use embedded_hal::i2c::I2c;

use crate::{Error, I2C_ADDRESS};

/// ALS integration time control register.
pub(crate) const REG_ATIME: u8 = 0x81;

/// First data register of the ALS block; channel `n` lives at `base + 2n`.
pub(crate) const REG_ALS_BASE: u8 = 0x94;

/// Power-on value written to ATIME during attach (shortest accumulation).
pub(crate) const ATIME_DEFAULT: u8 = 0xFF;

const REG_FIRST: u8 = REG_ATIME;
const REG_LAST: u8 = REG_ALS_BASE + 6;
const WINDOW: usize = (REG_LAST - REG_FIRST + 1) as usize;

const VOLATILE_FIRST: u8 = REG_ALS_BASE;
const VOLATILE_LAST: u8 = REG_ALS_BASE + 2;
const PRECIOUS_FIRST: u8 = REG_ALS_BASE + 4;
const PRECIOUS_LAST: u8 = REG_ALS_BASE + 6;

fn in_window(addr: u8) -> bool {
    (REG_FIRST..=REG_LAST).contains(&addr)
}

fn is_volatile(addr: u8) -> bool {
    (VOLATILE_FIRST..=VOLATILE_LAST).contains(&addr)
}

fn is_precious(addr: u8) -> bool {
    (PRECIOUS_FIRST..=PRECIOUS_LAST).contains(&addr)
}

/// Register file front end with a write-invalidated byte cache.
pub(crate) struct RegMap<I2C> {
    i2c: I2C,
    cache: [Option<u8>; WINDOW],
}

impl<I2C, E> RegMap<I2C>
where
    I2C: I2c<Error = E>,
{
    pub(crate) fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            cache: [None; WINDOW],
        }
    }

    /// Hand the bus interface back, dropping the cache.
    pub(crate) fn release(self) -> I2C {
        self.i2c
    }

    fn slot(addr: u8) -> usize {
        (addr - REG_FIRST) as usize
    }

    fn bus_read(&mut self, addr: u8) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(I2C_ADDRESS, &[addr], &mut buf)
            .map_err(Error::I2c)?;
        Ok(buf[0])
    }

    /// Read one register, from cache where the access class allows it.
    pub(crate) fn read(&mut self, addr: u8) -> Result<u8, Error<E>> {
        if !in_window(addr) {
            return Err(Error::RegisterOutOfRange(addr));
        }
        if is_volatile(addr) || is_precious(addr) {
            return self.bus_read(addr);
        }
        if let Some(value) = self.cache[Self::slot(addr)] {
            return Ok(value);
        }
        let value = self.bus_read(addr)?;
        self.cache[Self::slot(addr)] = Some(value);
        Ok(value)
    }

    /// Write one register and invalidate its cached byte.
    pub(crate) fn write(&mut self, addr: u8, value: u8) -> Result<(), Error<E>> {
        if !in_window(addr) {
            return Err(Error::RegisterOutOfRange(addr));
        }
        self.i2c
            .write(I2C_ADDRESS, &[addr, value])
            .map_err(Error::I2c)?;
        self.cache[Self::slot(addr)] = None;
        Ok(())
    }

    /// Read-modify-write under `mask`. The bus write is skipped when the
    /// masked value already matches the current register contents.
    pub(crate) fn update_bits(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), Error<E>> {
        let current = self.read(addr)?;
        let new = (current & !mask) | (value & mask);
        if new == current {
            return Ok(());
        }
        self.write(addr, new)
    }

    /// Read a 16-bit quantity stored low byte first at `addr`.
    pub(crate) fn read_pair(&mut self, addr: u8) -> Result<u16, Error<E>> {
        let lo = self.read(addr)?;
        let hi = self.read(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Write a 16-bit quantity low byte first at `addr`.
    pub(crate) fn write_pair(&mut self, addr: u8, value: u16) -> Result<(), Error<E>> {
        let [lo, hi] = value.to_le_bytes();
        self.write(addr, lo)?;
        self.write(addr.wrapping_add(1), hi)
    }
}
