//! Simulated PCI bus.

use std::collections::HashMap;

use log::trace;

use crate::config::{SimBarKind, SimPciDevice};
use crate::driver::pci::*;
use crate::driver::DriverResult;
use crate::status::{
    DEVICE_NOT_FOUND, INSUFFICIENT_RESOURCES, INVALID_HANDLE, INVALID_PARAMETER,
    NOT_IMPLEMENTED, OPERATION_ALREADY_DONE,
};

const CFG_SIZE: usize = 0x100;
const CFG_SIZE_EXPRESS: usize = 0x1000;
const FIRST_CAP: usize = 0x40;
const CAP_STRIDE: usize = 0x10;
const EXT_CAP_AER: usize = 0x100;
const EXT_CAP_SRIOV: usize = 0x140;
const SRIOV_TOTAL_VFS: usize = 0x0e;
const SRIOV_NUM_VFS: usize = 0x10;
const PAGE: u64 = 0x1000;

struct SimDevice {
    entry: PciScanEntry,
    cfg: Vec<u8>,
    bars: Vec<(AddrSpace, Vec<u8>)>,
    int_options: InterruptOptions,
    total_vfs: u32,
    num_vfs: u32,
    events: Option<EventHandler>,
    interrupts: Option<InterruptHandler>,
    int_count: u32,
    dma: Vec<DmaBuffer>,
}

impl SimDevice {
    fn new(spec: &SimPciDevice) -> Self {
        let express = spec.express;
        let mut cfg = vec![0u8; if express { CFG_SIZE_EXPRESS } else { CFG_SIZE }];
        put(&mut cfg, 0x00, 2, u64::from(spec.vendor_id));
        put(&mut cfg, 0x02, 2, u64::from(spec.device_id));
        put(&mut cfg, 0x04, 2, 0x0007);
        put(&mut cfg, 0x06, 2, 0x0010);
        put(&mut cfg, 0x08, 4, 0x0580_0001);
        put(&mut cfg, 0x2c, 2, u64::from(spec.vendor_id));
        put(&mut cfg, 0x2e, 2, u64::from(spec.device_id));
        put(&mut cfg, 0x3c, 1, 0x0b);
        put(&mut cfg, 0x3d, 1, 0x01);

        let mut bars = Vec::with_capacity(spec.bars.len());
        let mut mem_next = 0xf000_0000u64;
        let mut io_next = 0xe000u64;
        for (index, bar) in spec.bars.iter().enumerate() {
            let (kind, base) = match bar.kind {
                SimBarKind::Memory => {
                    let base = align_up(mem_next, bar.size);
                    mem_next = base + bar.size;
                    (AddrSpaceKind::Memory, base)
                }
                SimBarKind::Io => {
                    let base = align_up(io_next, bar.size);
                    io_next = base + bar.size;
                    (AddrSpaceKind::Io, base)
                }
            };
            let encoded = match kind {
                AddrSpaceKind::Memory => base,
                AddrSpaceKind::Io => base | 1,
            };
            put(&mut cfg, 0x10 + 4 * index, 4, encoded & 0xffff_ffff);
            let space = AddrSpace {
                bar: index,
                kind,
                base,
                size: bar.size,
                active: true,
            };
            bars.push((space, vec![0u8; bar.size as usize]));
        }

        let mut caps = vec![0x01u8];
        if spec.msi {
            caps.push(0x05);
        }
        if spec.msix {
            caps.push(0x11);
        }
        if express {
            caps.push(0x10);
        }
        put(&mut cfg, 0x34, 1, FIRST_CAP as u64);
        for (i, id) in caps.iter().enumerate() {
            let offset = FIRST_CAP + i * CAP_STRIDE;
            let next = if i + 1 < caps.len() { offset + CAP_STRIDE } else { 0 };
            put(&mut cfg, offset, 1, u64::from(*id));
            put(&mut cfg, offset + 1, 1, next as u64);
            if *id == 0x10 {
                put(&mut cfg, offset + 0x02, 2, 0x0002);
                put(&mut cfg, offset + 0x04, 4, 0x0000_8fc2);
                put(&mut cfg, offset + 0x0c, 4, 0x0003_4c12);
                put(&mut cfg, offset + 0x12, 2, 0x1012);
            }
        }

        let sriov = express && spec.total_vfs > 0;
        if express {
            let next = if sriov { EXT_CAP_SRIOV } else { 0 };
            put(&mut cfg, EXT_CAP_AER, 4, ext_cap_header(0x0001, 1, next));
        }
        if sriov {
            put(&mut cfg, EXT_CAP_SRIOV, 4, ext_cap_header(0x0010, 1, 0));
            put(&mut cfg, EXT_CAP_SRIOV + SRIOV_TOTAL_VFS, 2, u64::from(spec.total_vfs));
        }

        Self {
            entry: PciScanEntry {
                id: PciDeviceId {
                    vendor_id: spec.vendor_id,
                    device_id: spec.device_id,
                },
                slot: PciSlot {
                    domain: spec.domain,
                    bus: spec.bus,
                    slot: spec.slot,
                    function: spec.function,
                },
            },
            cfg,
            bars,
            int_options: InterruptOptions {
                level_sensitive: spec.level_sensitive,
                msi: spec.msi,
                msix: spec.msix,
            },
            total_vfs: if sriov { spec.total_vfs } else { 0 },
            num_vfs: 0,
            events: None,
            interrupts: None,
            int_count: 0,
            dma: Vec::new(),
        }
    }

    fn cfg_range(&self, offset: u32, len: usize) -> DriverResult<std::ops::Range<usize>> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.cfg.len() => Ok(start..end),
            _ => Err(INVALID_PARAMETER),
        }
    }

    fn bar_range(&self, bar: usize, offset: u64, len: usize) -> DriverResult<std::ops::Range<usize>> {
        let (space, _) = self.bars.get(bar).ok_or(INVALID_PARAMETER)?;
        let start = usize::try_from(offset).map_err(|_| INVALID_PARAMETER)?;
        match start.checked_add(len) {
            Some(end) if end as u64 <= space.size => Ok(start..end),
            _ => Err(INVALID_PARAMETER),
        }
    }

    fn interrupt_kind(&self) -> InterruptKind {
        let options = self.int_options;
        if options.msix {
            InterruptKind::MsiX
        } else if options.msi {
            InterruptKind::Msi
        } else if options.level_sensitive {
            InterruptKind::LevelSensitive
        } else {
            InterruptKind::EdgeTriggered
        }
    }
}

fn put(buf: &mut [u8], offset: usize, width: usize, value: u64) {
    buf[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

fn get(buf: &[u8], width: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..width].copy_from_slice(&buf[..width]);
    u64::from_le_bytes(bytes)
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

fn ext_cap_header(id: u64, version: u64, next: usize) -> u64 {
    id | (version << 16) | ((next as u64) << 20)
}

/// Simulated PCI bus serving the configured devices.
pub struct SimPci {
    devices: Vec<SimDevice>,
    open: HashMap<DeviceHandle, usize>,
    next_handle: u64,
    next_phys: u64,
    next_user: u64,
    next_dma_handle: u32,
}

impl SimPci {
    pub fn new(devices: &[SimPciDevice]) -> Self {
        Self {
            devices: devices.iter().map(SimDevice::new).collect(),
            open: HashMap::new(),
            next_handle: 0x1000,
            next_phys: 0x8000_0000,
            next_user: 0x7f00_0000_0000,
            next_dma_handle: 1,
        }
    }

    /// Handles that are currently open.
    pub fn open_handles(&self) -> Vec<DeviceHandle> {
        let mut handles: Vec<_> = self.open.keys().copied().collect();
        handles.sort_by_key(|h| h.0);
        handles
    }

    /// Deliver `event` to the handler registered for `handle`.
    ///
    /// Returns false when no handler is registered.
    pub fn fire_event(&self, handle: DeviceHandle, event: PciEvent) -> bool {
        match self.dev(handle).ok().and_then(|d| d.events.as_ref()) {
            Some(handler) => {
                handler(handle, event);
                true
            }
            None => false,
        }
    }

    /// Raise one interrupt on `handle`; false while interrupts are disabled.
    pub fn raise_interrupt(&mut self, handle: DeviceHandle) -> bool {
        let Ok(device) = self.dev_mut(handle) else {
            return false;
        };
        let kind = device.interrupt_kind();
        let Some(handler) = device.interrupts.as_ref() else {
            return false;
        };
        device.int_count += 1;
        let info = InterruptInfo {
            count: device.int_count,
            kind,
            message_data: matches!(kind, InterruptKind::Msi | InterruptKind::MsiX)
                .then_some(0x4020 + device.int_count),
        };
        handler(handle, &info);
        true
    }

    /// DMA buffers currently locked on `handle`.
    pub fn dma_buffers(&self, handle: DeviceHandle) -> usize {
        self.dev(handle).map(|d| d.dma.len()).unwrap_or(0)
    }

    fn dev(&self, handle: DeviceHandle) -> DriverResult<&SimDevice> {
        let index = *self.open.get(&handle).ok_or(INVALID_HANDLE)?;
        Ok(&self.devices[index])
    }

    fn dev_mut(&mut self, handle: DeviceHandle) -> DriverResult<&mut SimDevice> {
        let index = *self.open.get(&handle).ok_or(INVALID_HANDLE)?;
        Ok(&mut self.devices[index])
    }

    fn take_phys(&mut self, size: u64, stride: u64) -> u64 {
        let phys = self.next_phys;
        self.next_phys += align_up(size.max(1), PAGE) + stride;
        phys
    }
}

impl PciDriver for SimPci {
    fn scan(&mut self) -> DriverResult<Vec<PciScanEntry>> {
        Ok(self.devices.iter().map(|d| d.entry).collect())
    }

    fn open(&mut self, slot: PciSlot) -> DriverResult<DeviceHandle> {
        let index = self
            .devices
            .iter()
            .position(|d| d.entry.slot == slot)
            .ok_or(DEVICE_NOT_FOUND)?;
        if self.open.values().any(|i| *i == index) {
            return Err(OPERATION_ALREADY_DONE);
        }
        let handle = DeviceHandle(self.next_handle);
        self.next_handle += 0x10;
        self.open.insert(handle, index);
        trace!("sim: opened {} as {}", slot, handle);
        Ok(handle)
    }

    fn close(&mut self, handle: DeviceHandle) -> DriverResult<()> {
        let index = self.open.remove(&handle).ok_or(INVALID_HANDLE)?;
        let device = &mut self.devices[index];
        device.events = None;
        device.interrupts = None;
        device.dma.clear();
        trace!("sim: closed {}", handle);
        Ok(())
    }

    fn device_info(&self, handle: DeviceHandle) -> DriverResult<PciScanEntry> {
        Ok(self.dev(handle)?.entry)
    }

    fn read_cfg(&mut self, handle: DeviceHandle, offset: u32, width: AccessWidth) -> DriverResult<u64> {
        let device = self.dev(handle)?;
        let range = device.cfg_range(offset, width.bytes())?;
        Ok(get(&device.cfg[range], width.bytes()))
    }

    fn write_cfg(
        &mut self,
        handle: DeviceHandle,
        offset: u32,
        width: AccessWidth,
        value: u64,
    ) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        let range = device.cfg_range(offset, width.bytes())?;
        put(&mut device.cfg, range.start, width.bytes(), value);
        Ok(())
    }

    fn read_cfg_block(&mut self, handle: DeviceHandle, offset: u32, len: usize) -> DriverResult<Vec<u8>> {
        let device = self.dev(handle)?;
        let range = device.cfg_range(offset, len)?;
        Ok(device.cfg[range].to_vec())
    }

    fn write_cfg_block(&mut self, handle: DeviceHandle, offset: u32, data: &[u8]) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        let range = device.cfg_range(offset, data.len())?;
        device.cfg[range].copy_from_slice(data);
        Ok(())
    }

    fn addr_spaces(&self, handle: DeviceHandle) -> DriverResult<Vec<AddrSpace>> {
        Ok(self.dev(handle)?.bars.iter().map(|(space, _)| *space).collect())
    }

    fn read_addr(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        width: AccessWidth,
    ) -> DriverResult<u64> {
        let device = self.dev(handle)?;
        let range = device.bar_range(bar, offset, width.bytes())?;
        Ok(get(&device.bars[bar].1[range], width.bytes()))
    }

    fn write_addr(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        width: AccessWidth,
        value: u64,
    ) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        let range = device.bar_range(bar, offset, width.bytes())?;
        put(&mut device.bars[bar].1, range.start, width.bytes(), value);
        Ok(())
    }

    fn read_block(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        len: usize,
        width: AccessWidth,
    ) -> DriverResult<Vec<u8>> {
        if len % width.bytes() != 0 {
            return Err(INVALID_PARAMETER);
        }
        let device = self.dev(handle)?;
        let range = device.bar_range(bar, offset, len)?;
        Ok(device.bars[bar].1[range].to_vec())
    }

    fn write_block(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        data: &[u8],
        width: AccessWidth,
    ) -> DriverResult<()> {
        if data.len() % width.bytes() != 0 {
            return Err(INVALID_PARAMETER);
        }
        let device = self.dev_mut(handle)?;
        let range = device.bar_range(bar, offset, data.len())?;
        device.bars[bar].1[range].copy_from_slice(data);
        Ok(())
    }

    fn event_register(&mut self, handle: DeviceHandle, handler: EventHandler) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        if device.events.is_some() {
            return Err(OPERATION_ALREADY_DONE);
        }
        device.events = Some(handler);
        Ok(())
    }

    fn event_unregister(&mut self, handle: DeviceHandle) -> DriverResult<()> {
        self.dev_mut(handle)?
            .events
            .take()
            .map(|_| ())
            .ok_or(OPERATION_ALREADY_DONE)
    }

    fn events_registered(&self, handle: DeviceHandle) -> bool {
        self.dev(handle).is_ok_and(|d| d.events.is_some())
    }

    fn int_enable(&mut self, handle: DeviceHandle, handler: InterruptHandler) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        if device.interrupts.is_some() {
            return Err(OPERATION_ALREADY_DONE);
        }
        device.interrupts = Some(handler);
        device.int_count = 0;
        Ok(())
    }

    fn int_disable(&mut self, handle: DeviceHandle) -> DriverResult<()> {
        self.dev_mut(handle)?
            .interrupts
            .take()
            .map(|_| ())
            .ok_or(OPERATION_ALREADY_DONE)
    }

    fn int_enabled(&self, handle: DeviceHandle) -> bool {
        self.dev(handle).is_ok_and(|d| d.interrupts.is_some())
    }

    fn int_options(&self, handle: DeviceHandle) -> DriverResult<InterruptOptions> {
        Ok(self.dev(handle)?.int_options)
    }

    fn dma_alloc(&mut self, handle: DeviceHandle, request: DmaRequest) -> DriverResult<DmaBuffer> {
        self.dev(handle)?;
        let pages = match request {
            DmaRequest::Contiguous { size, addr_width } => {
                if size == 0 || addr_width > 64 {
                    return Err(INVALID_PARAMETER);
                }
                let phys = self.take_phys(u64::from(size), 0);
                if (1..64).contains(&addr_width) && phys + u64::from(size) > 1u64 << addr_width {
                    return Err(INSUFFICIENT_RESOURCES);
                }
                vec![DmaPage { phys_addr: phys, size }]
            }
            DmaRequest::ScatterGather { size } => {
                if size == 0 {
                    return Err(INVALID_PARAMETER);
                }
                let mut pages = Vec::new();
                let mut left = size;
                while left > 0 {
                    let chunk = left.min(PAGE as u32);
                    let phys = self.take_phys(PAGE, PAGE);
                    pages.push(DmaPage {
                        phys_addr: phys,
                        size: chunk,
                    });
                    left -= chunk;
                }
                pages
            }
            DmaRequest::Reserved { phys_addr, size } => {
                if size == 0 || phys_addr == 0 {
                    return Err(INVALID_PARAMETER);
                }
                vec![DmaPage { phys_addr, size }]
            }
        };

        let buffer = DmaBuffer {
            request,
            global_handle: self.next_dma_handle,
            user_addr: self.next_user,
            pages,
        };
        self.next_user += 0x10_0000;
        self.next_dma_handle += 1;
        self.dev_mut(handle)?.dma.push(buffer.clone());
        Ok(buffer)
    }

    fn dma_free(&mut self, handle: DeviceHandle, buffer: DmaBuffer) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        let index = device
            .dma
            .iter()
            .position(|b| b.user_addr == buffer.user_addr)
            .ok_or(INVALID_PARAMETER)?;
        device.dma.remove(index);
        Ok(())
    }

    fn sriov_enable(&mut self, handle: DeviceHandle, num_vfs: u32) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        if device.total_vfs == 0 {
            return Err(NOT_IMPLEMENTED);
        }
        if device.num_vfs > 0 {
            return Err(OPERATION_ALREADY_DONE);
        }
        if num_vfs == 0 || num_vfs > device.total_vfs {
            return Err(INVALID_PARAMETER);
        }
        device.num_vfs = num_vfs;
        put(&mut device.cfg, EXT_CAP_SRIOV + SRIOV_NUM_VFS, 2, u64::from(num_vfs));
        Ok(())
    }

    fn sriov_disable(&mut self, handle: DeviceHandle) -> DriverResult<()> {
        let device = self.dev_mut(handle)?;
        if device.total_vfs == 0 {
            return Err(NOT_IMPLEMENTED);
        }
        device.num_vfs = 0;
        put(&mut device.cfg, EXT_CAP_SRIOV + SRIOV_NUM_VFS, 2, 0);
        Ok(())
    }

    fn sriov_num_vfs(&self, handle: DeviceHandle) -> DriverResult<u32> {
        let device = self.dev(handle)?;
        if device.total_vfs == 0 {
            return Err(NOT_IMPLEMENTED);
        }
        Ok(device.num_vfs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn open_default() -> (SimPci, DeviceHandle) {
        let mut sim = SimPci::new(&[SimPciDevice::default()]);
        let slot = sim.scan().unwrap()[0].slot;
        let handle = sim.open(slot).unwrap();
        (sim, handle)
    }

    #[test]
    fn config_header_holds_ids() {
        let (mut sim, h) = open_default();
        assert_eq!(sim.read_cfg(h, 0, AccessWidth::Bits16).unwrap(), 0x10ee);
        assert_eq!(sim.read_cfg(h, 2, AccessWidth::Bits16).unwrap(), 0x7011);
        assert_eq!(sim.read_cfg(h, 0x34, AccessWidth::Bits8).unwrap(), 0x40);
    }

    #[test]
    fn config_writes_are_read_back() {
        let (mut sim, h) = open_default();
        sim.write_cfg_block(h, 0x80, &[1, 2, 3, 4]).unwrap();
        assert_eq!(sim.read_cfg(h, 0x80, AccessWidth::Bits32).unwrap(), 0x0403_0201);
        assert_eq!(sim.read_cfg_block(h, 0xffe, 4), Err(INVALID_PARAMETER));
    }

    #[test]
    fn bar_bounds_are_enforced() {
        let (mut sim, h) = open_default();
        let spaces = sim.addr_spaces(h).unwrap();
        assert_eq!(spaces[0].kind, AddrSpaceKind::Memory);
        assert_eq!(spaces[1].kind, AddrSpaceKind::Io);

        sim.write_addr(h, 0, 0x10, AccessWidth::Bits32, 0xdead_beef).unwrap();
        assert_eq!(sim.read_addr(h, 0, 0x10, AccessWidth::Bits16).unwrap(), 0xbeef);
        assert_eq!(
            sim.read_addr(h, 0, 0xffe, AccessWidth::Bits32),
            Err(INVALID_PARAMETER)
        );
        assert_eq!(sim.read_addr(h, 5, 0, AccessWidth::Bits8), Err(INVALID_PARAMETER));
    }

    #[test]
    fn interrupts_reach_the_handler() {
        let (mut sim, h) = open_default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        assert!(!sim.raise_interrupt(h));

        sim.int_enable(
            h,
            Box::new(move |_: DeviceHandle, info: &InterruptInfo| {
                sink.lock().unwrap().push(info.count)
            }),
        )
        .unwrap();
        assert!(sim.raise_interrupt(h));
        assert!(sim.raise_interrupt(h));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        sim.int_disable(h).unwrap();
        assert_eq!(sim.int_disable(h), Err(OPERATION_ALREADY_DONE));
    }

    #[test]
    fn sriov_tracks_vf_count() {
        let (mut sim, h) = open_default();
        assert_eq!(sim.sriov_enable(h, 9), Err(INVALID_PARAMETER));
        sim.sriov_enable(h, 4).unwrap();
        assert_eq!(sim.sriov_num_vfs(h).unwrap(), 4);
        assert_eq!(
            sim.read_cfg(h, (EXT_CAP_SRIOV + SRIOV_NUM_VFS) as u32, AccessWidth::Bits16)
                .unwrap(),
            4
        );
        sim.sriov_disable(h).unwrap();
        assert_eq!(sim.sriov_num_vfs(h).unwrap(), 0);
    }

    #[test]
    fn scatter_gather_splits_pages() {
        let (mut sim, h) = open_default();
        let buf = sim
            .dma_alloc(h, DmaRequest::ScatterGather { size: 0x2800 })
            .unwrap();
        assert_eq!(buf.pages.len(), 3);
        assert_eq!(buf.size(), 0x2800);
        assert_eq!(sim.dma_buffers(h), 1);
        sim.dma_free(h, buf).unwrap();
        assert_eq!(sim.dma_buffers(h), 0);
    }

    #[test]
    fn closed_handles_are_rejected() {
        let (mut sim, h) = open_default();
        sim.close(h).unwrap();
        assert_eq!(sim.read_cfg(h, 0, AccessWidth::Bits8), Err(INVALID_HANDLE));
        assert!(sim.open_handles().is_empty());
    }
}
