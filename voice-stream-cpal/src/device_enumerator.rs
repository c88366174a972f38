//! Device enumeration and selector resolution over the default cpal host.
//!
//! cpal 0.15 has no stable device ids, so the device name doubles as the
//! identifier carried in a [`DeviceSelector`].

use std::collections::HashSet;

use cpal::traits::{DeviceTrait, HostTrait};

use voice_stream_core::{AudioDevice, DeviceEnumerator, DeviceSelector, Direction, EngineError};

use crate::error::BackendError;

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Input => "input",
        Direction::Output => "output",
    }
}

fn default_device(host: &cpal::Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

fn all_devices(host: &cpal::Host, direction: Direction) -> Result<Vec<cpal::Device>, BackendError> {
    Ok(match direction {
        Direction::Input => host.input_devices()?.collect(),
        Direction::Output => host.output_devices()?.collect(),
    })
}

/// Resolve `selector` to a concrete device on the default host.
pub fn find_device(direction: Direction, selector: &DeviceSelector) -> Result<cpal::Device, BackendError> {
    let host = cpal::default_host();
    match selector.device_id() {
        None => default_device(&host, direction)
            .ok_or(BackendError::NoDefaultDevice(direction_name(direction))),
        Some(id) => all_devices(&host, direction)?
            .into_iter()
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| BackendError::DeviceNotFound {
                direction: direction_name(direction),
                id: id.to_string(),
            }),
    }
}

/// Lists devices of the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceEnumerator;

impl CpalDeviceEnumerator {
    pub fn new() -> Self {
        Self
    }

    fn list(&self, direction: Direction) -> Result<Vec<AudioDevice>, BackendError> {
        let host = cpal::default_host();
        let default_name = default_device(&host, direction).and_then(|d| d.name().ok());

        let mut seen = HashSet::new();
        let mut devices = Vec::new();
        for device in all_devices(&host, direction)? {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    log::debug!("Skipping unnamed {} device: {}", direction_name(direction), e);
                    continue;
                }
            };
            // Some hosts list the same endpoint twice
            if !seen.insert(name.clone()) {
                continue;
            }
            devices.push(AudioDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                label: name.clone(),
                id: name,
                direction,
            });
        }
        Ok(devices)
    }
}

impl DeviceEnumerator for CpalDeviceEnumerator {
    fn list_input_devices(&self) -> Result<Vec<AudioDevice>, EngineError> {
        Ok(self.list(Direction::Input)?)
    }

    fn list_output_devices(&self) -> Result<Vec<AudioDevice>, EngineError> {
        Ok(self.list(Direction::Output)?)
    }
}
