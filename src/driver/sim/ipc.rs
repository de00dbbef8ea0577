//! Simulated IPC group.

use std::collections::HashMap;

use log::trace;

use crate::config::SimIpcProcess;
use crate::driver::ipc::*;
use crate::driver::DriverResult;
use crate::status::{
    INSUFFICIENT_RESOURCES, INVALID_HANDLE, INVALID_PARAMETER, OPERATION_ALREADY_DONE,
    WRONG_UNIQUE_ID,
};

const MAX_SHARED_BUFFER: u64 = 0x1000_0000;
const FIRST_PEER_UID: u32 = 0x100;

struct Registration {
    process: IpcProcess,
    handler: MessageHandler,
}

struct SharedBuffer {
    info: KernelBuffer,
    data: Vec<u8>,
}

/// IPC service with a fixed set of peer processes.
///
/// Messages addressed to peers are only logged; tests read them back with
/// [`SimIpc::sent`]. Peers talk to this process through [`SimIpc::deliver`].
pub struct SimIpc {
    peers: Vec<IpcProcess>,
    registered: Option<Registration>,
    shared_int: Option<MessageHandler>,
    shared_ints_global: bool,
    sent: Vec<(Recipient, u32, u64)>,
    buffers: HashMap<u32, SharedBuffer>,
    next_uid: u32,
    next_handle: u32,
    next_user: u64,
    next_kernel: u64,
}

impl SimIpc {
    pub fn new(peers: &[SimIpcProcess]) -> Self {
        let peers: Vec<_> = peers
            .iter()
            .zip(FIRST_PEER_UID..)
            .map(|(peer, uid)| IpcProcess {
                name: peer.name.clone(),
                sub_group_id: peer.sub_group_id,
                uid,
            })
            .collect();
        Self {
            next_uid: FIRST_PEER_UID + peers.len() as u32,
            peers,
            registered: None,
            shared_int: None,
            shared_ints_global: false,
            sent: Vec::new(),
            buffers: HashMap::new(),
            next_handle: 1,
            next_user: 0x7e00_0000_0000,
            next_kernel: 0xffff_a000_0000_0000,
        }
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> &[(Recipient, u32, u64)] {
        &self.sent
    }

    /// Unique id of this process, while registered.
    pub fn own_uid(&self) -> Option<u32> {
        self.registered.as_ref().map(|r| r.process.uid)
    }

    /// Hand `message` to the registered handler; false when unregistered.
    pub fn deliver(&self, message: &IpcMessage) -> bool {
        match &self.registered {
            Some(registration) => {
                (registration.handler)(message);
                true
            }
            None => false,
        }
    }

    /// Raise a shared interrupt from a peer. Both the shared interrupt
    /// handler and the general message handler see it.
    pub fn raise_shared_interrupt(&self, data: u64) -> bool {
        let Some(handler) = &self.shared_int else {
            return false;
        };
        let message = IpcMessage {
            msg_id: 0,
            data,
            sender_uid: FIRST_PEER_UID,
        };
        handler(&message);
        self.deliver(&message);
        true
    }

    /// Bytes written so far into the buffer with `global_handle`.
    pub fn buffer_contents(&self, global_handle: u32) -> Option<&[u8]> {
        self.buffers.get(&global_handle).map(|b| b.data.as_slice())
    }

    /// Shared buffers currently allocated.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn own(&self) -> DriverResult<&IpcProcess> {
        self.registered.as_ref().map(|r| &r.process).ok_or(INVALID_HANDLE)
    }
}

impl IpcDriver for SimIpc {
    fn register(&mut self, identity: IpcIdentity<'_>, handler: MessageHandler) -> DriverResult<()> {
        if self.registered.is_some() {
            return Err(OPERATION_ALREADY_DONE);
        }
        let uid = self.next_uid;
        self.next_uid += 1;
        trace!(
            "sim: registered {:?} in group 0x{:x} as uid 0x{:x}",
            identity.name,
            identity.group_id,
            uid
        );
        self.registered = Some(Registration {
            process: IpcProcess {
                name: identity.name.to_string(),
                sub_group_id: identity.sub_group_id,
                uid,
            },
            handler,
        });
        Ok(())
    }

    fn unregister(&mut self) {
        if self.registered.take().is_some() {
            trace!("sim: unregistered");
        }
    }

    fn is_registered(&self) -> bool {
        self.registered.is_some()
    }

    fn scan_processes(&self) -> DriverResult<Vec<IpcProcess>> {
        let own = self.own()?;
        let mut processes = self.peers.clone();
        processes.push(own.clone());
        Ok(processes)
    }

    fn send(&mut self, recipient: Recipient, msg_id: u32, data: u64) -> DriverResult<()> {
        let own_uid = self.own()?.uid;
        if let Recipient::Uid(uid) = recipient {
            if uid != own_uid && !self.peers.iter().any(|p| p.uid == uid) {
                return Err(WRONG_UNIQUE_ID);
            }
        }
        trace!("sim: message 0x{:x} [0x{:x}] to {}", msg_id, data, recipient);
        self.sent.push((recipient, msg_id, data));
        Ok(())
    }

    fn shared_int_enable(
        &mut self,
        identity: IpcIdentity<'_>,
        handler: MessageHandler,
    ) -> DriverResult<()> {
        if self.shared_int.is_some() {
            return Err(OPERATION_ALREADY_DONE);
        }
        trace!(
            "sim: shared interrupts {:?} enabled for sub group 0x{:x}",
            identity.name,
            identity.sub_group_id
        );
        self.shared_int = Some(handler);
        self.shared_ints_global = true;
        Ok(())
    }

    fn shared_int_disable_local(&mut self) -> DriverResult<()> {
        self.shared_int.take().map(|_| ()).ok_or(OPERATION_ALREADY_DONE)
    }

    fn shared_int_disable_global(&mut self) -> DriverResult<()> {
        if !std::mem::replace(&mut self.shared_ints_global, false) {
            return Err(OPERATION_ALREADY_DONE);
        }
        Ok(())
    }

    fn shared_ints_enabled_locally(&self) -> bool {
        self.shared_int.is_some()
    }

    fn shared_buffer_alloc(&mut self, size: u64, layout: BufferLayout) -> DriverResult<KernelBuffer> {
        if size == 0 {
            return Err(INVALID_PARAMETER);
        }
        if size > MAX_SHARED_BUFFER {
            return Err(INSUFFICIENT_RESOURCES);
        }
        let info = KernelBuffer {
            global_handle: self.next_handle,
            user_addr: self.next_user,
            kernel_addr: self.next_kernel,
            size,
            layout,
        };
        self.next_handle += 1;
        self.next_user += 0x10_0000;
        self.next_kernel += 0x10_0000;
        self.buffers.insert(
            info.global_handle,
            SharedBuffer {
                info,
                data: Vec::new(),
            },
        );
        Ok(info)
    }

    fn shared_buffer_free(&mut self, buffer: KernelBuffer) -> DriverResult<()> {
        self.buffers
            .remove(&buffer.global_handle)
            .map(|_| ())
            .ok_or(INVALID_HANDLE)
    }

    fn shared_buffer_write(&mut self, buffer: &KernelBuffer, data: &[u8]) -> DriverResult<()> {
        let shared = self
            .buffers
            .get_mut(&buffer.global_handle)
            .ok_or(INVALID_HANDLE)?;
        if data.len() as u64 > shared.info.size {
            return Err(INVALID_PARAMETER);
        }
        if shared.data.len() < data.len() {
            shared.data.resize(data.len(), 0);
        }
        shared.data[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const IDENTITY: IpcIdentity<'static> = IpcIdentity {
        name: "test",
        group_id: 0x1234,
        sub_group_id: 7,
    };

    fn recorder() -> (Arc<Mutex<Vec<IpcMessage>>>, MessageHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Box::new(move |msg| sink.lock().unwrap().push(*msg));
        (seen, handler)
    }

    #[test]
    fn registration_is_required_and_single() {
        let mut sim = SimIpc::new(&[SimIpcProcess::default()]);
        assert_eq!(sim.scan_processes(), Err(INVALID_HANDLE));
        assert_eq!(sim.send(Recipient::Group, 1, 2), Err(INVALID_HANDLE));

        sim.register(IDENTITY, Box::new(|_| {})).unwrap();
        assert_eq!(sim.register(IDENTITY, Box::new(|_| {})), Err(OPERATION_ALREADY_DONE));
        assert_eq!(sim.own_uid(), Some(0x101));

        let procs = sim.scan_processes().unwrap();
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].uid, 0x100);
        assert_eq!(procs[1].name, "test");
        assert_eq!(procs[1].sub_group_id, 7);

        sim.unregister();
        assert!(!sim.is_registered());
    }

    #[test]
    fn unicast_checks_the_uid() {
        let mut sim = SimIpc::new(&[SimIpcProcess::default()]);
        sim.register(IDENTITY, Box::new(|_| {})).unwrap();
        assert_eq!(sim.send(Recipient::Uid(0x55), 1, 2), Err(WRONG_UNIQUE_ID));
        sim.send(Recipient::Uid(0x100), 3, 4).unwrap();
        sim.send(Recipient::SubGroup(9), 5, 6).unwrap();
        assert_eq!(
            sim.sent(),
            &[(Recipient::Uid(0x100), 3, 4), (Recipient::SubGroup(9), 5, 6)]
        );
    }

    #[test]
    fn shared_interrupts_reach_both_handlers() {
        let mut sim = SimIpc::new(&[]);
        let (general, handler) = recorder();
        sim.register(IDENTITY, handler).unwrap();
        assert!(!sim.raise_shared_interrupt(1));

        let (shared, handler) = recorder();
        sim.shared_int_enable(IDENTITY, handler).unwrap();
        assert!(sim.shared_ints_enabled_locally());
        assert!(sim.raise_shared_interrupt(0xab));
        assert_eq!(shared.lock().unwrap()[0].data, 0xab);
        assert_eq!(general.lock().unwrap().len(), 1);

        sim.shared_int_disable_local().unwrap();
        assert_eq!(sim.shared_int_disable_local(), Err(OPERATION_ALREADY_DONE));
        sim.shared_int_disable_global().unwrap();
        assert_eq!(sim.shared_int_disable_global(), Err(OPERATION_ALREADY_DONE));
    }

    #[test]
    fn shared_buffers_store_written_bytes() {
        let mut sim = SimIpc::new(&[]);
        assert_eq!(
            sim.shared_buffer_alloc(0, BufferLayout::Contiguous),
            Err(INVALID_PARAMETER)
        );
        assert_eq!(
            sim.shared_buffer_alloc(u64::MAX, BufferLayout::NonContiguous),
            Err(INSUFFICIENT_RESOURCES)
        );

        let buffer = sim.shared_buffer_alloc(16, BufferLayout::Contiguous).unwrap();
        assert_eq!(sim.buffer_contents(buffer.global_handle), Some(&[][..]));
        sim.shared_buffer_write(&buffer, b"abc").unwrap();
        assert_eq!(sim.shared_buffer_write(&buffer, &[0; 17]), Err(INVALID_PARAMETER));
        assert_eq!(sim.buffer_contents(buffer.global_handle), Some(&b"abc"[..]));

        sim.shared_buffer_free(buffer).unwrap();
        assert_eq!(sim.shared_buffer_free(buffer), Err(INVALID_HANDLE));
        assert_eq!(sim.buffer_count(), 0);
    }
}
