//! Simulated USB devices.

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::trace;

use crate::config::SimUsbDevice;
use crate::driver::usb::*;
use crate::driver::DriverResult;
use crate::status::{INVALID_HANDLE, INVALID_PARAMETER, OPERATION_ALREADY_DONE, OPERATION_FAILED};

const SERIAL_INDEX: u8 = 3;

struct SimUsbState {
    device: UsbDevice,
    serial: Option<String>,
    suspended: bool,
    pattern: u8,
}

impl SimUsbState {
    fn new(index: usize, spec: &SimUsbDevice) -> Self {
        let configurations = vec![UsbConfiguration {
            value: 1,
            interfaces: vec![UsbInterfaceInfo {
                number: 0,
                alt_settings: vec![
                    UsbAltSetting {
                        alternate: 0,
                        class: 0xff,
                        subclass: 0,
                        protocol: 0,
                        endpoints: vec![
                            endpoint(0x81, 0x02, 512, 0),
                            endpoint(0x02, 0x02, 512, 0),
                            endpoint(0x83, 0x03, 64, 1),
                        ],
                    },
                    UsbAltSetting {
                        alternate: 1,
                        class: 0xff,
                        subclass: 0,
                        protocol: 0,
                        endpoints: vec![endpoint(0x84, 0x01, 1024, 1)],
                    },
                ],
            }],
        }];

        let mut device = UsbDevice {
            handle: UsbDeviceHandle(0x2000 + 0x10 * index as u64),
            vendor_id: spec.vendor_id,
            product_id: spec.product_id,
            interface_number: 0,
            alt_setting: 0,
            configurations,
            pipe0: UsbPipe::control(64),
            pipes: Vec::new(),
        };
        device.pipes = active_pipes(&device);

        Self {
            device,
            serial: spec.serial.clone(),
            suspended: false,
            pattern: 0,
        }
    }

    fn device_descriptor(&self) -> [u8; 18] {
        let [vid_lo, vid_hi] = self.device.vendor_id.to_le_bytes();
        let [pid_lo, pid_hi] = self.device.product_id.to_le_bytes();
        let serial = if self.serial.is_some() { SERIAL_INDEX } else { 0 };
        [
            18, 1, 0x00, 0x02, 0, 0, 0, 64, vid_lo, vid_hi, pid_lo, pid_hi, 0x00, 0x01, 1, 2,
            serial, 1,
        ]
    }
}

fn endpoint(address: u8, attributes: u8, max_packet_size: u16, interval: u8) -> UsbEndpoint {
    UsbEndpoint {
        address,
        attributes,
        max_packet_size,
        interval,
    }
}

fn active_pipes(device: &UsbDevice) -> Vec<UsbPipe> {
    device
        .configurations
        .first()
        .and_then(|c| c.interfaces.iter().find(|i| i.number == device.interface_number))
        .and_then(|i| {
            i.alt_settings
                .iter()
                .find(|a| u32::from(a.alternate) == device.alt_setting)
        })
        .map(|alt| alt.endpoints.iter().map(UsbEndpoint::pipe).collect())
        .unwrap_or_default()
}

/// Simulated USB host serving the configured devices.
///
/// Non-control reads produce an incrementing byte pattern and each
/// transfer takes `transfer_delay`.
pub struct SimUsb {
    devices: Mutex<Vec<SimUsbState>>,
    transfer_delay: Duration,
}

impl SimUsb {
    pub fn new(devices: &[SimUsbDevice]) -> Self {
        Self {
            devices: Mutex::new(
                devices
                    .iter()
                    .enumerate()
                    .map(|(i, spec)| SimUsbState::new(i, spec))
                    .collect(),
            ),
            transfer_delay: Duration::from_millis(1),
        }
    }

    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    fn lock(&self) -> DriverResult<MutexGuard<'_, Vec<SimUsbState>>> {
        self.devices.lock().map_err(|_| OPERATION_FAILED)
    }

    fn with_device<R>(
        &self,
        handle: UsbDeviceHandle,
        f: impl FnOnce(&mut SimUsbState) -> DriverResult<R>,
    ) -> DriverResult<R> {
        let mut devices = self.lock()?;
        let state = devices
            .iter_mut()
            .find(|s| s.device.handle == handle)
            .ok_or(INVALID_HANDLE)?;
        f(state)
    }
}

impl UsbDriver for SimUsb {
    fn devices(&self) -> DriverResult<Vec<UsbDevice>> {
        Ok(self.lock()?.iter().map(|s| s.device.clone()).collect())
    }

    fn device(&self, handle: UsbDeviceHandle) -> DriverResult<UsbDevice> {
        self.with_device(handle, |s| Ok(s.device.clone()))
    }

    fn set_interface(&self, handle: UsbDeviceHandle, interface: u32, alt_setting: u32) -> DriverResult<()> {
        self.with_device(handle, |s| {
            let known = s
                .device
                .configurations
                .first()
                .and_then(|c| c.interfaces.iter().find(|i| i.number == interface))
                .is_some_and(|i| (alt_setting as usize) < i.alt_settings.len());
            if !known {
                return Err(INVALID_PARAMETER);
            }
            s.device.interface_number = interface;
            s.device.alt_setting = alt_setting;
            s.device.pipes = active_pipes(&s.device);
            trace!("sim: {} now on interface {} alt {}", handle, interface, alt_setting);
            Ok(())
        })
    }

    fn reset_pipe(&self, handle: UsbDeviceHandle, pipe: u32) -> DriverResult<()> {
        self.with_device(handle, |s| {
            s.device.find_pipe(pipe).map(|_| ()).ok_or(INVALID_PARAMETER)
        })
    }

    fn transfer(
        &self,
        handle: UsbDeviceHandle,
        pipe: u32,
        direction: PipeDirection,
        buf: &mut [u8],
        setup: Option<&[u8; 8]>,
    ) -> DriverResult<usize> {
        let moved = self.with_device(handle, |s| {
            let info = s.device.find_pipe(pipe).ok_or(INVALID_PARAMETER)?;

            if info.kind == PipeType::Control {
                let setup = setup.ok_or(INVALID_PARAMETER)?;
                let requested = usize::from(u16::from_le_bytes([setup[6], setup[7]]));
                let len = buf.len().min(requested);
                if direction == PipeDirection::In {
                    let is_get_device_descriptor =
                        setup[0] == 0x80 && setup[1] == 0x06 && setup[3] == 0x01;
                    let descriptor = s.device_descriptor();
                    let reply: &[u8] = if is_get_device_descriptor {
                        &descriptor
                    } else {
                        &[]
                    };
                    let n = len.min(reply.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                    return Ok(n);
                }
                return Ok(len);
            }

            if info.direction != direction {
                return Err(INVALID_PARAMETER);
            }
            if direction == PipeDirection::In {
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = s.pattern.wrapping_add(i as u8);
                }
                s.pattern = s.pattern.wrapping_add(1);
            }
            Ok(buf.len())
        })?;

        if pipe != 0 && !self.transfer_delay.is_zero() {
            thread::sleep(self.transfer_delay);
        }
        Ok(moved)
    }

    fn halt_transfer(&self, handle: UsbDeviceHandle, pipe: u32) -> DriverResult<()> {
        self.with_device(handle, |s| {
            s.device.find_pipe(pipe).map(|_| ()).ok_or(INVALID_PARAMETER)
        })
    }

    fn selective_suspend(&self, handle: UsbDeviceHandle, submit: bool) -> DriverResult<()> {
        self.with_device(handle, |s| {
            if s.suspended == submit {
                return Err(OPERATION_ALREADY_DONE);
            }
            s.suspended = submit;
            Ok(())
        })
    }

    fn serial_number(&self, handle: UsbDeviceHandle) -> DriverResult<Option<SerialNumber>> {
        self.with_device(handle, |s| {
            Ok(s.serial.as_ref().map(|value| SerialNumber {
                index: SERIAL_INDEX,
                value: value.clone(),
            }))
        })
    }

    fn properties(&self, handle: UsbDeviceHandle) -> DriverResult<Vec<(String, String)>> {
        self.with_device(handle, |s| {
            Ok(vec![
                (
                    "WdDevicePropertyDeviceDescription".to_string(),
                    "Simulated USB device".to_string(),
                ),
                (
                    "WdDevicePropertyHardwareID".to_string(),
                    format!(
                        "USB\\VID_{:04X}&PID_{:04X}",
                        s.device.vendor_id, s.device.product_id
                    ),
                ),
                ("WdDevicePropertyManufacturer".to_string(), "diagmenu".to_string()),
                (
                    "WdDevicePropertyAddress".to_string(),
                    format!("{}", (s.device.handle.0 - 0x2000) / 0x10 + 1),
                ),
            ])
        })
    }
}
