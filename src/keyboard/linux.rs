//! Linux keyboard backend using evdev and uinput.
//!
//! Every device under `/dev/input` that has letter keys and Enter is read.
//! Corrections are typed through a uinput virtual keyboard, which the source
//! skips by name so replayed keys are never segmented again.

use crate::keyboard::collector::{DeviceError, KeyEventSource, KeyInjector, SourcePoll};
use crate::keyboard::layout::{injectable_codes, keystroke_for, KeyTranslator};
use crate::keyboard::types::{codes, KeyEvent};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType, InputEvent, Key};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::collections::VecDeque;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const VIRTUAL_KEYBOARD_NAME: &str = "autocorrector virtual keyboard";

/// Sleep between sweeps over the devices while nothing is pending.
const SWEEP_INTERVAL: Duration = Duration::from_millis(5);

/// Open every physical keyboard and create the virtual one.
pub fn open_devices() -> Result<(Box<dyn KeyEventSource>, Box<dyn KeyInjector>), DeviceError> {
    let source = EvdevSource::open()?;
    let injector = UinputInjector::create()?;
    Ok((Box::new(source), Box::new(injector)))
}

fn is_keyboard(device: &Device) -> bool {
    if device.name() == Some(VIRTUAL_KEYBOARD_NAME) {
        return false;
    }
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
}

fn set_nonblocking(device: &Device) -> Result<(), DeviceError> {
    fcntl(device.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map_err(|e| DeviceError::Io(e.into()))?;
    Ok(())
}

/// Reads key events from all physical keyboards.
pub struct EvdevSource {
    devices: Vec<(PathBuf, Device)>,
    translator: KeyTranslator,
    pending: VecDeque<KeyEvent>,
}

impl EvdevSource {
    pub fn open() -> Result<Self, DeviceError> {
        let mut devices = Vec::new();
        for (path, device) in evdev::enumerate() {
            if !is_keyboard(&device) {
                continue;
            }
            set_nonblocking(&device)?;
            tracing::info!(
                path = %path.display(),
                name = device.name().unwrap_or("unnamed"),
                "reading keyboard"
            );
            devices.push((path, device));
        }

        if devices.is_empty() {
            return Err(DeviceError::Open(
                "no readable keyboard under /dev/input".to_string(),
            ));
        }
        Ok(Self {
            devices,
            translator: KeyTranslator::new(),
            pending: VecDeque::new(),
        })
    }

    /// Drain whatever every device has buffered, dropping devices that fail.
    fn sweep(&mut self) {
        let translator = &mut self.translator;
        let pending = &mut self.pending;
        self.devices.retain_mut(|(path, device)| match device.fetch_events() {
            Ok(events) => {
                for event in events.filter(|e| e.event_type() == EventType::KEY) {
                    pending.extend(translator.translate(event.code(), event.value()));
                }
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), "keyboard went away: {e}");
                false
            }
        });
    }
}

impl KeyEventSource for EvdevSource {
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, DeviceError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(SourcePoll::Event(event));
            }
            self.sweep();
            if !self.pending.is_empty() {
                continue;
            }
            if self.devices.is_empty() {
                return Ok(SourcePoll::Closed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(SourcePoll::Idle);
            }
            std::thread::sleep(SWEEP_INTERVAL.min(deadline - now));
        }
    }
}

/// Types corrections through a uinput device.
pub struct UinputInjector {
    device: VirtualDevice,
}

impl UinputInjector {
    pub fn create() -> Result<Self, DeviceError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in injectable_codes() {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(VIRTUAL_KEYBOARD_NAME).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| DeviceError::Virtual(e.to_string()))?;
        Ok(Self { device })
    }

    fn tap(&mut self, code: u16, shift: bool) -> Result<(), DeviceError> {
        let key = |code, value| InputEvent::new(EventType::KEY, code, value);
        let mut batch = Vec::with_capacity(4);
        if shift {
            batch.push(key(codes::KEY_LEFTSHIFT, 1));
        }
        batch.push(key(code, 1));
        batch.push(key(code, 0));
        if shift {
            batch.push(key(codes::KEY_LEFTSHIFT, 0));
        }
        self.device.emit(&batch)?;
        Ok(())
    }
}

impl KeyInjector for UinputInjector {
    fn backspace(&mut self) -> Result<(), DeviceError> {
        self.tap(codes::KEY_BACKSPACE, false)
    }

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
        for c in text.chars() {
            match keystroke_for(c) {
                Some(stroke) => self.tap(stroke.code, stroke.shift)?,
                None => tracing::warn!("cannot type {c:?} on the virtual keyboard"),
            }
        }
        Ok(())
    }
}
