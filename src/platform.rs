//! Services the embedding platform provides around the sensor core.
//!
//! Bus discovery, triggered-capture buffering, interrupt-line wiring, power
//! lifecycle and device registration all live outside this crate. The driver
//! only needs to call them in the right order during attach, capture control
//! and detach, so they are modeled as one trait with no-op defaults.

/// Failure reported by a platform service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum PlatformError {
    /// No resources left to satisfy the request.
    NoMemory,
    /// The service is not provided on this platform.
    Unsupported,
    /// Platform-specific numeric cause.
    Other(i32),
}

/// Hooks invoked by the driver during attach, capture control and detach.
///
/// Every method defaults to a no-op so integrations only implement the
/// services they actually provide; [`NoopPlatform`] is the empty
/// implementation for setups without buffering, interrupts or power
/// management.
pub trait Platform {
    /// Prepare the triggered-capture buffer backing bulk reads.
    fn buffer_setup(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Start moving samples into the capture buffer.
    fn buffer_start(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Stop moving samples into the capture buffer.
    fn buffer_stop(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Wire the threshold-event machinery up.
    fn event_setup(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Tear the threshold-event machinery down.
    fn event_teardown(&mut self) {}

    /// Register the falling-edge, one-shot interrupt handler.
    fn irq_register(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Release the interrupt line.
    fn irq_unregister(&mut self) {}

    /// Mark the device active and enable runtime power tracking.
    fn power_up(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Disable runtime power tracking. Must not fail.
    fn power_down(&mut self) {}

    /// Publish the device to the surrounding system.
    fn device_register(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Withdraw the device from the surrounding system.
    fn device_unregister(&mut self) {}
}

/// Platform with no buffering, no interrupt line and no power management.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl Platform for NoopPlatform {}
