//! DMA buffer allocation submenu.

use log::{error, info};

use super::PciSession;
use crate::console::{input_number, input_u32, print_error, print_success, Console, Input};
use crate::diag::status_text;
use crate::driver::{DmaBuffer, DmaRequest, Recipient, IPC_MSG_CONTIG_DMA_BUFFER_READY};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId};
use crate::status::{Status, INVALID_PARAMETER};

/// Holds at most one locked buffer; it is released on exit.
pub struct DmaMenu {
    session: PciSession,
    buffer: Option<DmaBuffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocKind {
    Contiguous,
    ScatterGather,
    Reserved,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(DmaMenu {
        session: session.clone(),
        buffer: None,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Allocate/free memory for DMA")
            .title("DMA memory")
            .on_exit(|menu: &mut DmaMenu, console| {
                menu.free(console)?;
                Ok(Status::SUCCESS)
            })
            .hidden_when(|menu: &DmaMenu| !menu.session.has_device()),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Allocate contiguous memory").on_entry(|menu: &mut DmaMenu, console| {
                menu.allocate(console, AllocKind::Contiguous)
            }),
            MenuOption::new("Allocate scatter-gather memory").on_entry(
                |menu: &mut DmaMenu, console| menu.allocate(console, AllocKind::ScatterGather),
            ),
            MenuOption::new("Use reserved memory").on_entry(|menu: &mut DmaMenu, console| {
                menu.allocate(console, AllocKind::Reserved)
            }),
            MenuOption::new("Send buffer through IPC to all group processes")
                .on_entry(DmaMenu::send_to_group)
                .hidden_when(|menu: &DmaMenu| menu.buffer.is_none() || menu.session.ipc().is_none()),
            MenuOption::new("Free DMA memory").on_entry(|menu: &mut DmaMenu, console| {
                menu.free(console)?;
                Ok(Status::SUCCESS)
            }),
        ],
        &ctx,
    )?;
    Ok(())
}

/// Prompt for the parameters of a `kind` allocation. `None` when the
/// operator cancels or types something invalid.
fn read_request(console: &mut dyn Console, kind: AllocKind) -> DiagResult<Option<DmaRequest>> {
    let phys_addr = if kind == AllocKind::Reserved {
        match input_number(console, "Enter reserved memory address (64 bit hex uint) ", true, 1, u64::MAX)? {
            Input::Value(addr) => addr,
            _ => return Ok(None),
        }
    } else {
        0
    };

    let size = match input_u32(
        console,
        "Enter memory allocation size in bytes (32 bit uint) ",
        false,
        1,
        u32::MAX,
    )? {
        Input::Value(size) => size,
        _ => return Ok(None),
    };

    Ok(Some(match kind {
        AllocKind::Contiguous => {
            let prompt = "Enter DMA address width of an address that your device supports, \
                          use 0 for default value (32 bit uint)";
            let Input::Value(addr_width) = input_u32(console, prompt, false, 0, 64)? else {
                return Ok(None);
            };
            DmaRequest::Contiguous { size, addr_width }
        }
        AllocKind::ScatterGather => DmaRequest::ScatterGather { size },
        AllocKind::Reserved => DmaRequest::Reserved { phys_addr, size },
    }))
}

impl DmaMenu {
    fn allocate(&mut self, console: &mut dyn Console, kind: AllocKind) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let Some(request) = read_request(console, kind)? else {
            return Ok(INVALID_PARAMETER);
        };

        self.free(console)?;

        let allocated = self.session.driver().dma_alloc(handle, request);
        let buffer = match allocated {
            Ok(buffer) => buffer,
            Err(status) => {
                let what = match kind {
                    AllocKind::Contiguous => "Failed allocating contiguous memory",
                    AllocKind::ScatterGather => "Failed allocating SG memory",
                    AllocKind::Reserved => "Failed claiming reserved memory",
                };
                error!("{:?} DMA allocation on {} failed: {}", kind, handle, status);
                print_error(
                    console,
                    &format!(
                        "{}. size [{}], Error [{}]",
                        what,
                        request_size(request),
                        status_text(status)
                    ),
                )?;
                return Ok(status);
            }
        };

        info!("allocated {:?} DMA buffer of {} bytes on {}", kind, buffer.size(), handle);
        let first = buffer.pages.first().copied();
        match (kind, first) {
            (AllocKind::Contiguous, Some(page)) => writeln!(
                console,
                "Contiguous memory allocated. user addr [0x{:x}], physical addr [0x{:x}], size [{}(0x{:x})]",
                buffer.user_addr, page.phys_addr, page.size, page.size
            )?,
            (AllocKind::Reserved, Some(page)) => writeln!(
                console,
                "Reserved memory claimed. user addr [0x{:x}], bus addr [0x{:x}], size [{}(0x{:x})]",
                buffer.user_addr, page.phys_addr, page.size, page.size
            )?,
            _ => {
                writeln!(
                    console,
                    "SG memory allocated. user addr [0x{:x}], size [{}]",
                    buffer.user_addr,
                    buffer.size()
                )?;
                writeln!(console, "Pages physical addresses:")?;
                for (i, page) in buffer.pages.iter().enumerate() {
                    writeln!(
                        console,
                        "{}) physical addr [0x{:x}], size [{}(0x{:x})]",
                        i + 1,
                        page.phys_addr,
                        page.size,
                        page.size
                    )?;
                }
            }
        }
        self.buffer = Some(buffer);
        Ok(Status::SUCCESS)
    }

    /// Announce the held buffer to the IPC group by its global handle.
    /// Only contiguous buffers can be shared.
    fn send_to_group(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let (Some(buffer), Some(ipc)) = (&self.buffer, self.session.ipc()) else {
            return Ok(INVALID_PARAMETER);
        };
        if !matches!(buffer.request, DmaRequest::Contiguous { .. }) {
            print_error(console, "Sharing SG DMA is not supported")?;
            return Ok(INVALID_PARAMETER);
        }

        let handle = buffer.global_handle;
        let sent = ipc
            .borrow_mut()
            .send(Recipient::Group, IPC_MSG_CONTIG_DMA_BUFFER_READY, u64::from(handle));
        match sent {
            Ok(()) => {
                info!("sent DMA buffer 0x{:x} to the IPC group", handle);
                print_success(console, "DMA contiguous buffer handle sent successfully")?;
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

    /// Release the held buffer, if any.
    fn free(&mut self, console: &mut dyn Console) -> DiagResult<()> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(_) => return Ok(()),
        };
        let freed = self.session.driver().dma_free(handle, buffer);
        match freed {
            Ok(()) => print_success(console, "DMA memory freed"),
            Err(status) => print_error(
                console,
                &format!(
                    "Failed trying to free DMA memory. Error [{}]",
                    status_text(status)
                ),
            ),
        }
    }
}

fn request_size(request: DmaRequest) -> u32 {
    match request {
        DmaRequest::Contiguous { size, .. }
        | DmaRequest::ScatterGather { size }
        | DmaRequest::Reserved { size, .. } => size,
    }
}
