//! Inter-process communication port.
//!
//! Processes using the same driver register into a group and exchange
//! 32-bit message ids with 64-bit payloads. The same service carries
//! shared interrupts and lets a process hand a kernel buffer to the rest of
//! its group by global handle.

use std::fmt;

use super::DriverResult;

/// Message id announcing a shared kernel buffer; the payload is its global
/// handle.
pub const IPC_MSG_KERNEL_BUFFER_READY: u32 = 1;
/// Message id announcing a contiguous DMA buffer; the payload is its global
/// handle.
pub const IPC_MSG_CONTIG_DMA_BUFFER_READY: u32 = 2;

/// Physical layout requested for a shared kernel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferLayout {
    #[default]
    Contiguous,
    NonContiguous,
}

impl fmt::Display for BufferLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contiguous => "contiguous",
            Self::NonContiguous => "non-contiguous",
        })
    }
}

/// Kernel buffer other processes can attach to by its global handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelBuffer {
    pub global_handle: u32,
    pub user_addr: u64,
    pub kernel_addr: u64,
    pub size: u64,
    pub layout: BufferLayout,
}

/// One process registered in the caller's group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcProcess {
    pub name: String,
    pub sub_group_id: u32,
    /// Unique id assigned at registration
    pub uid: u32,
}

/// Name, group and sub group a process registers under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcIdentity<'a> {
    pub name: &'a str,
    pub group_id: u32,
    pub sub_group_id: u32,
}

/// Message received by a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcMessage {
    pub msg_id: u32,
    pub data: u64,
    pub sender_uid: u32,
}

/// Called from driver context for every incoming message.
pub type MessageHandler = Box<dyn Fn(&IpcMessage) + Send>;

/// Addressing of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// A single process, by unique id
    Uid(u32),
    /// Every process of one sub group
    SubGroup(u32),
    /// Every process in the group
    Group,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uid(uid) => write!(f, "process 0x{:x}", uid),
            Self::SubGroup(id) => write!(f, "sub group 0x{:x}", id),
            Self::Group => f.write_str("the whole group"),
        }
    }
}

/// Access to the driver's IPC service and shared kernel buffers.
pub trait IpcDriver {
    fn register(&mut self, identity: IpcIdentity<'_>, handler: MessageHandler) -> DriverResult<()>;
    fn unregister(&mut self);
    fn is_registered(&self) -> bool;
    /// Processes currently registered in the caller's group, the caller
    /// included.
    fn scan_processes(&self) -> DriverResult<Vec<IpcProcess>>;
    fn send(&mut self, recipient: Recipient, msg_id: u32, data: u64) -> DriverResult<()>;

    fn shared_int_enable(&mut self, identity: IpcIdentity<'_>, handler: MessageHandler)
        -> DriverResult<()>;
    /// Stop receiving shared interrupts in this process only.
    fn shared_int_disable_local(&mut self) -> DriverResult<()>;
    /// Stop shared interrupts for every process of the group.
    fn shared_int_disable_global(&mut self) -> DriverResult<()>;
    fn shared_ints_enabled_locally(&self) -> bool;

    fn shared_buffer_alloc(&mut self, size: u64, layout: BufferLayout) -> DriverResult<KernelBuffer>;
    fn shared_buffer_free(&mut self, buffer: KernelBuffer) -> DriverResult<()>;
    /// Copy `data` to the start of `buffer`.
    fn shared_buffer_write(&mut self, buffer: &KernelBuffer, data: &[u8]) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_describe_their_scope() {
        assert_eq!(Recipient::Uid(0x20).to_string(), "process 0x20");
        assert_eq!(Recipient::SubGroup(3).to_string(), "sub group 0x3");
        assert_eq!(Recipient::Group.to_string(), "the whole group");
        assert_eq!(BufferLayout::default(), BufferLayout::Contiguous);
    }
}
