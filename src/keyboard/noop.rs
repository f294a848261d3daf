//! Noop keyboard backend.
//!
//! Used for `--dry-run` and on targets without a device backend. The source
//! never produces events and the injector only logs.

use crate::keyboard::collector::{DeviceError, KeyEventSource, KeyInjector, SourcePoll};
use std::time::Duration;

/// A source that never emits events.
#[derive(Debug, Default)]
pub struct NoopSource;

impl KeyEventSource for NoopSource {
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, DeviceError> {
        std::thread::sleep(timeout);
        Ok(SourcePoll::Idle)
    }
}

/// An injector that discards everything it is asked to type.
#[derive(Debug, Default)]
pub struct NoopInjector;

impl KeyInjector for NoopInjector {
    fn backspace(&mut self) -> Result<(), DeviceError> {
        tracing::trace!("noop injector: backspace");
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
        tracing::trace!(len = text.chars().count(), "noop injector: text");
        Ok(())
    }
}

/// Open the system keyboard and create the virtual keyboard.
///
/// `dry_run` asks for the noop devices. Otherwise the evdev backend is used on
/// Linux and other targets fail with [`DeviceError::NoBackend`].
pub fn open_system_devices(
    dry_run: bool,
) -> Result<(Box<dyn KeyEventSource>, Box<dyn KeyInjector>), DeviceError> {
    if dry_run {
        tracing::warn!("dry run: using noop keyboard devices, no corrections will be typed");
        return Ok((Box::new(NoopSource), Box::new(NoopInjector)));
    }
    open_backend()
}

#[cfg(target_os = "linux")]
fn open_backend() -> Result<(Box<dyn KeyEventSource>, Box<dyn KeyInjector>), DeviceError> {
    crate::keyboard::linux::open_devices()
}

#[cfg(not(target_os = "linux"))]
fn open_backend() -> Result<(Box<dyn KeyEventSource>, Box<dyn KeyInjector>), DeviceError> {
    Err(DeviceError::NoBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_source_is_idle() {
        let mut source = NoopSource;
        assert_eq!(
            source.poll_event(Duration::from_millis(1)).unwrap(),
            SourcePoll::Idle
        );
    }

    #[test]
    fn test_dry_run_opens_noop_devices() {
        let (mut source, mut injector) = open_system_devices(true).unwrap();
        assert_eq!(
            source.poll_event(Duration::from_millis(1)).unwrap(),
            SourcePoll::Idle
        );
        injector.type_text("the ").unwrap();
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_open_without_backend_is_fatal() {
        assert!(matches!(open_system_devices(false), Err(DeviceError::NoBackend)));
    }
}
