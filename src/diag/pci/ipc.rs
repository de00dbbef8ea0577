//! Shared kernel buffers and inter-process communication.
//!
//! Both submenus are only present when the session was built with an IPC
//! driver. The IPC menu keeps at most one kernel buffer shared with the
//! group; the shared buffer menu keeps its own, released on exit.

use std::io::Write;
use std::rc::Rc;

use log::{info, warn};

use super::PciSession;
use crate::console::{
    input_number, input_u32, print_error, print_success, Console, Input, NotifySink,
};
use crate::diag::status_text;
use crate::driver::{
    BufferLayout, IpcDriver, IpcIdentity, IpcMessage, KernelBuffer, MessageHandler, Recipient,
    IPC_MSG_CONTIG_DMA_BUFFER_READY, IPC_MSG_KERNEL_BUFFER_READY,
};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId, Shared};
use crate::status::{Status, INVALID_PARAMETER, OPERATION_ALREADY_DONE};

pub const DEFAULT_PROCESS_NAME: &str = "Diagnostic program";
pub const DEFAULT_PROCESS_GROUP_ID: u32 = 0x1234_5678;
pub const DEFAULT_SHARED_INT_NAME: &str = "WinDriver IPC Shared Interrupt";

/// Written to the start of every kernel buffer shared with the group.
pub const SAMPLE_BUFFER_DATA: &str = "This is a sample buffer data";

pub struct SharedBufferMenu {
    ipc: Shared<dyn IpcDriver>,
    buffer: Option<KernelBuffer>,
}

pub struct IpcMenu {
    ipc: Shared<dyn IpcDriver>,
    notify: NotifySink,
    sub_group_id: u32,
    kernel_buffer: Option<KernelBuffer>,
}

/// Which kind of send a menu option performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendKind {
    Unicast,
    SubGroup,
    Group,
}

/// Add the shared buffer and IPC submenus under `parent`. Does nothing when
/// the session has no IPC driver.
pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let Some(ipc) = session.ipc() else {
        return Ok(());
    };
    attach_shared_buffer(tree, parent, Rc::clone(&ipc))?;
    attach_ipc(tree, parent, ipc, session.notify())
}

fn attach_shared_buffer(
    tree: &mut MenuTree,
    parent: NodeId,
    ipc: Shared<dyn IpcDriver>,
) -> DiagResult<()> {
    let ctx = shared(SharedBufferMenu { ipc, buffer: None });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Allocate/free Shared Buffer")
            .title("Shared Buffer Operations")
            .on_exit(|menu: &mut SharedBufferMenu, console| {
                menu.free(console)?;
                Ok(Status::SUCCESS)
            }),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Allocate contiguous shared buffer").on_entry(
                |menu: &mut SharedBufferMenu, console| {
                    menu.allocate(console, BufferLayout::Contiguous)
                },
            ),
            MenuOption::new("Allocate non-contiguous shared buffer").on_entry(
                |menu: &mut SharedBufferMenu, console| {
                    menu.allocate(console, BufferLayout::NonContiguous)
                },
            ),
            MenuOption::new("Free shared buffer").on_entry(|menu: &mut SharedBufferMenu, console| {
                menu.free(console)?;
                Ok(Status::SUCCESS)
            }),
        ],
        &ctx,
    )?;
    Ok(())
}

fn attach_ipc(
    tree: &mut MenuTree,
    parent: NodeId,
    ipc: Shared<dyn IpcDriver>,
    notify: NotifySink,
) -> DiagResult<()> {
    let ctx = shared(IpcMenu {
        ipc,
        notify,
        sub_group_id: 0,
        kernel_buffer: None,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Manage IPC").on_entry(IpcMenu::print_header),
        &ctx,
    )?;

    let unregistered = |menu: &IpcMenu| !menu.ipc.borrow().is_registered();
    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Register process")
                .on_entry(IpcMenu::register)
                .hidden_when(|menu: &IpcMenu| menu.ipc.borrow().is_registered()),
            MenuOption::new("Un-Register process")
                .on_entry(IpcMenu::unregister)
                .hidden_when(unregistered),
            MenuOption::new("Find current registered group processes")
                .on_entry(IpcMenu::scan)
                .hidden_when(unregistered),
            MenuOption::new("Unicast - Send message to a single process by unique ID")
                .on_entry(|menu: &mut IpcMenu, console| menu.send(console, SendKind::Unicast))
                .hidden_when(unregistered),
            MenuOption::new("Multicast - Send message to a subGroup")
                .on_entry(|menu: &mut IpcMenu, console| menu.send(console, SendKind::SubGroup))
                .hidden_when(unregistered),
            MenuOption::new("Multicast - Send message to all processes in current group")
                .on_entry(|menu: &mut IpcMenu, console| menu.send(console, SendKind::Group))
                .hidden_when(unregistered),
            MenuOption::new("Enable Shared Interrupts via IPC")
                .on_entry(IpcMenu::enable_shared_ints)
                .hidden_when(unregistered),
            MenuOption::new("Locally Disable Shared Interrupts via IPC")
                .on_entry(IpcMenu::disable_shared_ints_locally)
                .hidden_when(unregistered),
            MenuOption::new("Globally Disable Shared Interrupts via IPC")
                .on_entry(IpcMenu::disable_shared_ints_globally)
                .hidden_when(unregistered),
            MenuOption::new("Allocate and share a kernel buffer with all processes in current group")
                .on_entry(IpcMenu::share_kernel_buffer)
                .hidden_when(unregistered),
            MenuOption::new("Free shared kernel buffer")
                .on_entry(IpcMenu::release_kernel_buffer)
                .hidden_when(unregistered),
        ],
        &ctx,
    )?;
    Ok(())
}

fn notify_line(sink: &NotifySink, text: &str) {
    let Ok(mut out) = sink.lock() else {
        return;
    };
    if let Err(e) = writeln!(out, "{}", text) {
        warn!("dropped IPC notification: {}", e);
    }
    let _ = out.flush();
}

/// Handler that prints every IPC message to `sink`.
///
/// Runs in driver context, so it only reports what arrived; it does not
/// attach to the announced buffers.
pub fn message_printer(sink: NotifySink) -> MessageHandler {
    Box::new(move |msg: &IpcMessage| {
        let kind = match msg.msg_id {
            IPC_MSG_KERNEL_BUFFER_READY => {
                format!("This is a shared kernel buffer, global handle [0x{:x}]", msg.data)
            }
            IPC_MSG_CONTIG_DMA_BUFFER_READY => {
                format!("This is a DMA buffer, global handle [0x{:x}]", msg.data)
            }
            _ => "Unknown IPC type".to_string(),
        };
        notify_line(
            &sink,
            &format!(
                "\nReceived an IPC message:\nmsgID [0x{:x}], msgData [0x{:x}] from process [0x{:x}]\n{}",
                msg.msg_id, msg.data, msg.sender_uid, kind
            ),
        );
    })
}

/// Handler for shared interrupts delivered over IPC.
pub fn shared_int_printer(sink: NotifySink) -> MessageHandler {
    Box::new(move |msg: &IpcMessage| {
        notify_line(
            &sink,
            &format!(
                "Shared Interrupt via IPC arrived:\nmsgID [0x{:x}], msgData [0x{:x}] from process [0x{:x}]",
                msg.msg_id, msg.data, msg.sender_uid
            ),
        );
    })
}

impl SharedBufferMenu {
    fn allocate(&mut self, console: &mut dyn Console, layout: BufferLayout) -> DiagResult<Status> {
        let size = match input_u32(
            console,
            "Enter memory allocation size in bytes (32 bit uint) ",
            false,
            1,
            u32::MAX,
        )? {
            Input::Value(size) => size,
            _ => return Ok(INVALID_PARAMETER),
        };

        self.free(console)?;

        let allocated = self.ipc.borrow_mut().shared_buffer_alloc(u64::from(size), layout);
        match allocated {
            Ok(buffer) => {
                info!("allocated {} shared buffer of {} bytes", layout, size);
                writeln!(
                    console,
                    "Shared buffer allocated. User addr [0x{:x}], kernel addr [0x{:x}], size [{}(0x{:x})]",
                    buffer.user_addr, buffer.kernel_addr, size, size
                )?;
                self.buffer = Some(buffer);
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed allocating shared buffer memory. size [{}], Error [{}]",
                        size,
                        status_text(status)
                    ),
                )?;
                Ok(status)
            }
        }
    }

    fn free(&mut self, console: &mut dyn Console) -> DiagResult<()> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };
        let freed = self.ipc.borrow_mut().shared_buffer_free(buffer);
        match freed {
            Ok(()) => print_success(console, "Shared buffer memory freed"),
            Err(status) => print_error(
                console,
                &format!(
                    "Failed freeing shared buffer memory. Error [{}]",
                    status_text(status)
                ),
            ),
        }
    }
}

impl IpcMenu {
    fn print_header(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        if self.ipc.borrow().is_registered() {
            writeln!(
                console,
                "\nIPC management menu - Registered with SubGroup ID 0x{:x}",
                self.sub_group_id
            )?;
        } else {
            writeln!(console, "\nIPC management menu - Unregistered")?;
        }
        writeln!(console, "--------------")?;
        Ok(Status::SUCCESS)
    }

    fn register(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let Input::Value(sub_group_id) =
            input_u32(console, "Enter process SubGroup ID (hex)", true, 0, u32::MAX)?
        else {
            return Ok(Status::SUCCESS);
        };

        let identity = IpcIdentity {
            name: DEFAULT_PROCESS_NAME,
            group_id: DEFAULT_PROCESS_GROUP_ID,
            sub_group_id,
        };
        let handler = message_printer(NotifySink::clone(&self.notify));
        let registered = self.ipc.borrow_mut().register(identity, handler);
        match registered {
            Ok(()) => {
                info!("registered to IPC with sub group 0x{:x}", sub_group_id);
                self.sub_group_id = sub_group_id;
                print_success(console, "Registration completed successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed registering process to IPC. Error [{}]",
                        status_text(status)
                    ),
                )?;
                Ok(status)
            }
        }
    }

    fn unregister(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        self.ipc.borrow_mut().unregister();
        info!("unregistered from IPC");
        print_success(console, "Process unregistered successfully")?;
        Ok(Status::SUCCESS)
    }

    fn scan(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let scanned = self.ipc.borrow().scan_processes();
        let processes = match scanned {
            Ok(processes) => processes,
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed scanning registered processes. Error [{}]",
                        status_text(status)
                    ),
                )?;
                return Ok(status);
            }
        };

        if processes.is_empty() {
            writeln!(console, "No processes found in current group")?;
            return Ok(Status::SUCCESS);
        }
        writeln!(console, "Found {} processes in current group", processes.len())?;
        for (i, process) in processes.iter().enumerate() {
            writeln!(
                console,
                "  {}) Name: {}, SubGroup ID: 0x{:x}, UID: 0x{:x}",
                i + 1,
                process.name,
                process.sub_group_id,
                process.uid
            )?;
        }
        Ok(Status::SUCCESS)
    }

    fn send(&mut self, console: &mut dyn Console, kind: SendKind) -> DiagResult<Status> {
        let recipient = match kind {
            SendKind::Group => Recipient::Group,
            SendKind::Unicast | SendKind::SubGroup => {
                let prompt = if kind == SendKind::Unicast {
                    "Enter recipient UID (hex)"
                } else {
                    "Enter recipient(s) SubGroup ID (hex)"
                };
                let Input::Value(id) = input_u32(console, prompt, true, 0, u32::MAX)? else {
                    return Ok(INVALID_PARAMETER);
                };
                if kind == SendKind::Unicast {
                    Recipient::Uid(id)
                } else {
                    Recipient::SubGroup(id)
                }
            }
        };

        let Input::Value(msg_id) =
            input_u32(console, "Enter your message ID (32Bit hex)", true, 0, u32::MAX)?
        else {
            return Ok(INVALID_PARAMETER);
        };
        let Input::Value(data) =
            input_number(console, "Enter your message (64Bit hex)", true, 0, u64::MAX)?
        else {
            return Ok(INVALID_PARAMETER);
        };

        let sent = self.ipc.borrow_mut().send(recipient, msg_id, data);
        match sent {
            Ok(()) => {
                info!("sent IPC message 0x{:x} to {}", msg_id, recipient);
                print_success(console, "Message sent successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed sending message. Error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }

    fn enable_shared_ints(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        if self.ipc.borrow().shared_ints_enabled_locally() {
            print_error(console, "Shared interrupts already enabled locally.")?;
            return Ok(OPERATION_ALREADY_DONE);
        }

        let prompt = "Enter shared interrupt's SubGroup ID (hex)";
        let Input::Value(sub_group_id) = input_u32(console, prompt, true, 1, u32::MAX)? else {
            return Ok(Status::SUCCESS);
        };

        let identity = IpcIdentity {
            name: DEFAULT_SHARED_INT_NAME,
            group_id: DEFAULT_PROCESS_GROUP_ID,
            sub_group_id,
        };
        let handler = shared_int_printer(NotifySink::clone(&self.notify));
        let enabled = self.ipc.borrow_mut().shared_int_enable(identity, handler);
        match enabled {
            Ok(()) => {
                info!("shared interrupts enabled for sub group 0x{:x}", sub_group_id);
                print_success(console, "Shared interrupts via IPC enabled successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed enabling shared interrupts via IPC. Error [{}]",
                        status_text(status)
                    ),
                )?;
                Ok(status)
            }
        }
    }

    fn disable_shared_ints_locally(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let disabled = self.ipc.borrow_mut().shared_int_disable_local();
        if disabled.is_ok() {
            writeln!(console, "\nShared ints successfully disabled locally")?;
        } else {
            writeln!(console, "\nShared ints already disabled locally")?;
        }
        Ok(Status::SUCCESS)
    }

    /// Stop shared interrupts for the whole group, then locally.
    fn disable_shared_ints_globally(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let disabled = self.ipc.borrow_mut().shared_int_disable_global();
        if disabled.is_ok() {
            writeln!(console, "\nShared ints successfully disabled globally")?;
        } else {
            writeln!(console, "\nShared ints already disabled globally")?;
        }
        self.disable_shared_ints_locally(console)
    }

    fn share_kernel_buffer(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        self.release_kernel_buffer(console)?;

        let prompt = "Enter new kernel buffer size to allocate and share with current group";
        let size = match input_number(console, prompt, true, 1, u64::from(u32::MAX))? {
            Input::Value(size) => size,
            _ => return Ok(INVALID_PARAMETER),
        };

        let mut ipc = self.ipc.borrow_mut();
        let buffer = match ipc.shared_buffer_alloc(size, BufferLayout::Contiguous) {
            Ok(buffer) => buffer,
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed allocating shared kernel buffer. size [{}], Error [{}]",
                        size,
                        status_text(status)
                    ),
                )?;
                return Ok(status);
            }
        };
        self.kernel_buffer = Some(buffer);
        writeln!(
            console,
            "Successful kernel buffer allocation. UserAddr [0x{:x}], KernelAddr [0x{:x}], size [0x{:x}]",
            buffer.user_addr, buffer.kernel_addr, size
        )?;

        let sample = SAMPLE_BUFFER_DATA.as_bytes();
        if size > sample.len() as u64 + 1 {
            let mut data = sample.to_vec();
            data.push(0);
            match ipc.shared_buffer_write(&buffer, &data) {
                Ok(()) => writeln!(console, "Sample data written to kernel buffer")?,
                Err(status) => warn!("writing sample data failed: {}", status),
            }
        } else {
            writeln!(console, "Kernel buffer is too short for sample data")?;
        }

        let sent = ipc.send(
            Recipient::Group,
            IPC_MSG_KERNEL_BUFFER_READY,
            u64::from(buffer.global_handle),
        );
        match sent {
            Ok(()) => {
                info!("shared kernel buffer 0x{:x} with the group", buffer.global_handle);
                print_success(console, "Kernel buffer shared successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed sending message. Error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }

    /// Free the buffer shared with the group. Peers that attached to it
    /// keep their mapping until they release it.
    fn release_kernel_buffer(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let Some(buffer) = self.kernel_buffer.take() else {
            return Ok(OPERATION_ALREADY_DONE);
        };
        let freed = self.ipc.borrow_mut().shared_buffer_free(buffer);
        match freed {
            Ok(()) => {
                print_success(console, "Kernel buffer freed")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed freeing shared buffer. Error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }
}
