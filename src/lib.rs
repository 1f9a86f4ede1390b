//! # APDS-9960 Digital ALS and RGB Color Sensor Driver
//!
//! This is a platform-agnostic Rust driver for the APDS-9960 combined
//! ambient-light (ALS) and RGB color sensor, built using the
//! [`embedded-hal`] traits for I2C communication.
//!
//! The ALS engine of the APDS-9960 provides:
//! - Four light-intensity channels: clear, red, green and blue
//! - Programmable ADC integration time (1 ms to 1 s)
//! - Programmable gain (1x, 4x, 16x, 64x)
//! - A clear-channel threshold comparator raising a falling-edge, one-shot
//!   interrupt
//! - I2C interface (address 0x39)
//!
//! ## Features
//!
//! - **Cached register access** with volatile/self-clearing register
//!   classification, so configuration reads avoid bus traffic while
//!   accumulator and latched-status reads never go stale
//! - **Threshold-crossing events** delivered through a bounded,
//!   fire-and-forget channel that an interrupt handler can feed without
//!   taking the device lock
//! - **Triggered-capture hooks** for platforms with a streaming buffer
//! - **Mockable platform services** so attach/detach sequencing is testable
//!   off-target
//!
//! ## Register map
//!
//! | Address     | Meaning                          | Access class        |
//! |-------------|----------------------------------|---------------------|
//! | 0x81        | ATIME integration-time control   | readable, cacheable |
//! | 0x94–0x95   | Clear channel (16-bit)           | readable, volatile  |
//! | 0x96–0x97   | Red channel (16-bit)             | readable            |
//! | 0x98–0x99   | Green channel (16-bit)           | readable, precious  |
//! | 0x9A        | Blue channel low byte            | readable, precious  |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apds9960::{AlsChannel, Apds9960, Config, EventChannel, NoopPlatform};
//!
//! # fn main() {
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! static EVENTS: EventChannel = EventChannel::new();
//!
//! let mut sensor = Apds9960::attach(i2c, NoopPlatform, &EVENTS, Config::default()).unwrap();
//!
//! // Lengthen the integration window, then read two of the channels.
//! sensor.set_integration_time(100).unwrap();
//! let clear = sensor.read_raw(AlsChannel::Clear).unwrap();
//! let red = sensor.read_raw(AlsChannel::Red).unwrap();
//! # let _ = (clear, red);
//! # }
//! ```
//!
//! ## Threshold events
//!
//! Arm the comparator through the threshold accessors, then feed the event
//! channel from the interrupt handler. The handler side never blocks and
//! never touches the bus; events fired with no subscriber are dropped.
//!
//! ```rust,no_run
//! use apds9960::{Apds9960, Config, EventChannel, NoopPlatform};
//!
//! # fn main() {
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! static EVENTS: EventChannel = EventChannel::new();
//!
//! let mut sensor = Apds9960::attach(i2c, NoopPlatform, &EVENTS, Config::default()).unwrap();
//! sensor.set_threshold(0x0800).unwrap();
//!
//! let subscription = EVENTS.subscribe();
//!
//! // From the interrupt handler, with a monotonic microsecond clock:
//! # let now_us = 0u64;
//! EVENTS.handle_interrupt(now_us);
//!
//! if let Some(event) = subscription.try_next() {
//!     // event.threshold, event.timestamp_us
//! #   let _ = event;
//! }
//! # }
//! ```
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![no_std]
#![deny(missing_docs)]

use embedded_hal::i2c::I2c;
use log::{debug, error};

mod events;
mod platform;
mod regmap;

pub use events::{EventChannel, EventSubscription, ThresholdEvent};
pub use platform::{NoopPlatform, Platform, PlatformError};

use regmap::RegMap;

/// I2C address of the APDS-9960 sensor.
pub const I2C_ADDRESS: u8 = 0x39;

/// Textual device name used by enumeration glue.
pub const DRV_NAME: &str = "apds9960";

/// ACPI-style match identifier.
pub const ACPI_MATCH: &str = "APDS9960";

/// Bus-tree-style compatible string.
pub const OF_COMPATIBLE: &str = "avago,apds9960";

/// Longest ADC integration window, in microseconds.
pub const MAX_INT_TIME_US: u32 = 1_000_000;

/// Largest value the clear-channel threshold comparator accepts.
pub const MAX_ALS_THRESHOLD: u16 = 0xFFFF;

/// The four light-intensity channels of the ALS engine.
///
/// Each channel accumulates into a 16-bit register pair, low byte first, at
/// `0x94 + 2 * index`. [`Clear`](Self::Clear) doubles as the interrupt
/// source channel for the threshold comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum AlsChannel {
    /// Unfiltered illuminance channel.
    Clear = 0,
    /// Red-filtered channel.
    Red = 1,
    /// Green-filtered channel.
    Green = 2,
    /// Blue-filtered channel.
    Blue = 3,
}

impl AlsChannel {
    /// All channels, in register order.
    pub const ALL: [AlsChannel; 4] = [
        AlsChannel::Clear,
        AlsChannel::Red,
        AlsChannel::Green,
        AlsChannel::Blue,
    ];

    /// Bus address of the channel's low data byte.
    pub const fn address(self) -> u8 {
        regmap::REG_ALS_BASE + (self as u8) * 2
    }

    /// Resolve a numeric channel identifier, `None` for anything that is
    /// not one of the four intensity channels.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(AlsChannel::Clear),
            1 => Some(AlsChannel::Red),
            2 => Some(AlsChannel::Green),
            3 => Some(AlsChannel::Blue),
            _ => None,
        }
    }
}

/// Static description of one intensity channel for publishing glue.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec {
    /// Which channel this entry describes.
    pub channel: AlsChannel,
    /// Bus address of the channel's low data byte.
    pub address: u8,
    /// Position in the capture-buffer scan, when the channel contributes
    /// to streamed data. No channel does in this configuration.
    pub scan_index: Option<u8>,
}

/// Channel table exposed to publishing glue, in register order.
pub const CHANNELS: [ChannelSpec; 4] = [
    ChannelSpec {
        channel: AlsChannel::Clear,
        address: AlsChannel::Clear.address(),
        scan_index: None,
    },
    ChannelSpec {
        channel: AlsChannel::Red,
        address: AlsChannel::Red.address(),
        scan_index: None,
    },
    ChannelSpec {
        channel: AlsChannel::Green,
        address: AlsChannel::Green.address(),
        scan_index: None,
    },
    ChannelSpec {
        channel: AlsChannel::Blue,
        address: AlsChannel::Blue.address(),
        scan_index: None,
    },
];

/// Calibrated intensity scale, expressed as a binary fraction: the factor
/// resolves as `value / 2^log2_denom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    /// Fraction numerator.
    pub value: i32,
    /// Base-2 exponent of the fraction denominator.
    pub log2_denom: i32,
}

/// Scale reported for every intensity channel.
pub const ALS_SCALE: Scale = Scale {
    value: 0,
    log2_denom: 10000,
};

/// All possible errors in this crate.
#[derive(Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// I2C communication error.
    I2c(E),
    /// Register address outside the readable window.
    RegisterOutOfRange(u8),
    /// Gain multiplier is not one of 1, 4, 16 or 64.
    InvalidGain(u8),
    /// Capture-buffer service failed.
    Buffer(PlatformError),
    /// Threshold-event service failed.
    Event(PlatformError),
    /// Interrupt-line registration failed.
    Interrupt(PlatformError),
    /// Power-lifecycle service failed.
    Power(PlatformError),
    /// Device registration failed.
    Registry(PlatformError),
}

/// Attach-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// ADC gain multiplier; the hardware supports 1, 4, 16 and 64. Other
    /// values are accepted here but rejected by every operation that
    /// consumes the gain.
    pub gain: u8,
}

impl Default for Config {
    fn default() -> Self {
        // Hardware reset gain is 1x.
        Self { gain: 1 }
    }
}

const fn gain_select(gain: u8) -> Option<u8> {
    match gain {
        1 => Some(0),
        4 => Some(1),
        16 => Some(2),
        64 => Some(3),
        _ => None,
    }
}

/// High-level APDS-9960 driver.
///
/// One value per attached sensor, created by [`attach`](Self::attach) and
/// consumed by [`detach`](Self::detach). Every register operation and every
/// multi-step sequence takes `&mut self`, so exclusive access doubles as the
/// per-device lock; use [`SharedApds9960`] to serialize callers across
/// execution contexts. The interrupt path goes through the shared
/// [`EventChannel`] and never contends for this lock.
pub struct Apds9960<'a, I2C, P = NoopPlatform> {
    regmap: RegMap<I2C>,
    platform: P,
    events: &'a EventChannel,
    als_gain: u8,
    als_gain_sel: u8,
    als_adc_int_us: u32,
    als_int: u16,
    capture_active: bool,
}

/// A driver shared between execution contexts behind a blocking mutex.
///
/// Multi-step sequences (integration-time update, threshold round-trip)
/// must run inside a single `lock` closure so a concurrent gain change
/// cannot interleave with a threshold access.
pub type SharedApds9960<'a, M, I2C, P = NoopPlatform> =
    embassy_sync::blocking_mutex::Mutex<M, core::cell::RefCell<Apds9960<'a, I2C, P>>>;

impl<'a, I2C, E, P> Apds9960<'a, I2C, P>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    P: Platform,
{
    /// Bring the sensor up and wire in the platform services.
    ///
    /// The sequence is: bootstrap write of the timing register, capture
    /// buffer setup, threshold-event setup, interrupt registration, power
    /// bring-up, device registration. The first failure is logged and
    /// returned and no driver value is produced; resources held by the
    /// platform are released when it drops. A registration failure also
    /// powers the device back down.
    pub fn attach(
        i2c: I2C,
        mut platform: P,
        events: &'a EventChannel,
        config: Config,
    ) -> Result<Self, Error<E>> {
        let mut regmap = RegMap::new(i2c);

        // Put the timing register into a known state before any cached
        // read is trusted.
        if let Err(e) = regmap.write(regmap::REG_ATIME, regmap::ATIME_DEFAULT) {
            error!("failed to write timing register: {:?}", e);
            return Err(e);
        }

        if let Err(e) = platform.buffer_setup() {
            error!("failed to set up capture buffer: {:?}", e);
            return Err(Error::Buffer(e));
        }

        if let Err(e) = platform.event_setup() {
            error!("failed to set up threshold events: {:?}", e);
            return Err(Error::Event(e));
        }

        if let Err(e) = platform.irq_register() {
            error!("failed to register interrupt line: {:?}", e);
            return Err(Error::Interrupt(e));
        }

        if let Err(e) = platform.power_up() {
            error!("failed to enable power tracking: {:?}", e);
            return Err(Error::Power(e));
        }

        if let Err(e) = platform.device_register() {
            error!("failed to register device: {:?}", e);
            platform.power_down();
            return Err(Error::Registry(e));
        }

        debug!("{} attached", DRV_NAME);

        Ok(Self {
            regmap,
            platform,
            events,
            als_gain: config.gain,
            als_gain_sel: 0,
            als_adc_int_us: 0,
            als_int: 0,
            capture_active: false,
        })
    }

    /// Tear the sensor down and return the bus interface.
    ///
    /// Teardown cannot fail: events, registration, power tracking and the
    /// interrupt line are released unconditionally.
    pub fn detach(self) -> I2C {
        let Self {
            regmap,
            mut platform,
            ..
        } = self;

        platform.event_teardown();
        platform.device_unregister();
        platform.power_down();
        platform.irq_unregister();

        debug!("{} detached", DRV_NAME);

        regmap.release()
    }

    /// Read a channel's raw 16-bit accumulator count.
    pub fn read_raw(&mut self, channel: AlsChannel) -> Result<u16, Error<E>> {
        self.regmap.read_pair(channel.address())
    }

    /// Calibrated scale factor for a channel's raw count.
    pub fn read_scale(&self, channel: AlsChannel) -> Scale {
        match channel {
            AlsChannel::Clear | AlsChannel::Red | AlsChannel::Green | AlsChannel::Blue => ALS_SCALE,
        }
    }

    /// Program the ADC integration window.
    ///
    /// `steps` is the 8-bit integration step count; the timing register
    /// receives its complement (`255 - steps`). The resulting window length
    /// in microseconds is derived from the step count and the current gain
    /// and clamped to [1 ms, 1 s]. An unsupported gain fails with
    /// [`Error::InvalidGain`] before any bus traffic, leaving prior state
    /// unchanged.
    pub fn set_integration_time(&mut self, steps: u8) -> Result<(), Error<E>> {
        // 64-bit arithmetic keeps the worst case (256 steps at 64x gain)
        // exact before clamping.
        let int_time_us = (1_000_000i64 * (256 - i64::from(steps)) * i64::from(self.als_gain)
            / 1000)
            .clamp(1_000, i64::from(MAX_INT_TIME_US));

        let gain_sel = gain_select(self.als_gain).ok_or(Error::InvalidGain(self.als_gain))?;

        self.regmap.update_bits(regmap::REG_ATIME, 0xFF, 255 - steps)?;

        self.als_adc_int_us = int_time_us as u32;
        self.als_gain_sel = gain_sel;
        Ok(())
    }

    /// Integration window committed by the last successful
    /// [`set_integration_time`](Self::set_integration_time), in
    /// microseconds. Zero until the window is first programmed.
    pub fn integration_time_us(&self) -> u32 {
        self.als_adc_int_us
    }

    /// Current ADC gain multiplier.
    pub fn gain(&self) -> u8 {
        self.als_gain
    }

    /// Change the ADC gain multiplier used by integration-time conversion.
    pub fn set_gain(&mut self, gain: u8) -> Result<(), Error<E>> {
        gain_select(gain).ok_or(Error::InvalidGain(gain))?;
        self.als_gain = gain;
        Ok(())
    }

    /// 2-bit gain-select code committed by the last successful
    /// integration-time update.
    pub fn gain_code(&self) -> u8 {
        self.als_gain_sel
    }

    /// Read the clear-channel register pair.
    ///
    /// The pair is dual-purpose: it is both the current clear reading and
    /// the value arming the threshold comparator. Reads always go to the
    /// bus (the pair is volatile) and refresh the tag attached to emitted
    /// events.
    pub fn threshold(&mut self) -> Result<u16, Error<E>> {
        let value = self.regmap.read_pair(AlsChannel::Clear.address())?;
        self.als_int = value;
        self.events.record_threshold(value);
        Ok(value)
    }

    /// Arm (or disarm) the threshold comparator by writing the
    /// clear-channel register pair. Accepts the full 16-bit range up to
    /// [`MAX_ALS_THRESHOLD`].
    pub fn set_threshold(&mut self, value: u16) -> Result<(), Error<E>> {
        self.regmap.write_pair(AlsChannel::Clear.address(), value)?;
        self.als_int = value;
        self.events.record_threshold(value);
        Ok(())
    }

    /// Last threshold value mirrored from the hardware by
    /// [`threshold`](Self::threshold) or
    /// [`set_threshold`](Self::set_threshold).
    pub fn last_threshold(&self) -> u16 {
        self.als_int
    }

    /// Start the platform's triggered capture.
    ///
    /// The accumulator registers a capture would sample are classified
    /// volatile, so capture activity cannot leave stale bytes in the
    /// register cache.
    pub fn enable_capture(&mut self) -> Result<(), Error<E>> {
        self.platform.buffer_start().map_err(Error::Buffer)?;
        self.capture_active = true;
        Ok(())
    }

    /// Stop the platform's triggered capture.
    pub fn disable_capture(&mut self) -> Result<(), Error<E>> {
        self.platform.buffer_stop().map_err(Error::Buffer)?;
        self.capture_active = false;
        Ok(())
    }

    /// Whether triggered capture is currently running.
    pub fn capture_active(&self) -> bool {
        self.capture_active
    }

    /// The event channel this driver tags.
    pub fn events(&self) -> &'a EventChannel {
        self.events
    }
}
