//! Early boot sequence.
//!
//! Order matters: the table is populated and the controllers remapped with
//! interrupts off, the boot information is checked before any memory is
//! handed out, and interrupts come on only after the table is loaded.

pub mod arch;
pub mod boot_info;
pub mod handoff;
pub mod idt;

use x86_64::{instructions::interrupts, VirtAddr};

use crate::config::KernelConfig;
use crate::paging::{PagingError, PagingState};
use crate::port::{HardwarePorts, PortIo};
use arch::x86::pic::{ChainedPics, PicError, KEYBOARD_IRQ, PICS};
use arch::x86::pit::{Pit, TimerConfig, TimerError};
use boot_info::{BootInfoError, BootInformation};
use handoff::HandoffError;
use idt::InterruptTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelInitError {
    /// The interrupt table was already claimed.
    TableClaimed,
    Handoff(HandoffError),
    BootInfo(BootInfoError),
    Pic(PicError),
    Timer(TimerError),
    Paging(PagingError),
}

impl KernelInitError {
    pub fn description(&self) -> &'static str {
        match self {
            Self::TableClaimed => "interrupt table already claimed",
            Self::Handoff(err) => err.description(),
            Self::BootInfo(err) => err.description(),
            Self::Pic(err) => err.description(),
            Self::Timer(err) => err.description(),
            Self::Paging(err) => err.description(),
        }
    }

    /// Single-character code for the fatal report.
    pub fn code(&self) -> char {
        match self {
            Self::TableClaimed => 'D',
            Self::Handoff(err) => err.code(),
            Self::BootInfo(err) => err.code(),
            Self::Pic(_) => 'C',
            Self::Timer(_) => 'H',
            Self::Paging(PagingError::BootInfo(err)) => err.code(),
            Self::Paging(_) => 'V',
        }
    }
}

impl core::fmt::Display for KernelInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TableClaimed => write!(f, "{}", self.description()),
            Self::Handoff(err) => write!(f, "{}", err),
            Self::BootInfo(err) => write!(f, "{}", err),
            Self::Pic(err) => write!(f, "{}", err),
            Self::Timer(err) => write!(f, "{}", err),
            Self::Paging(err) => write!(f, "{}", err),
        }
    }
}

impl From<HandoffError> for KernelInitError {
    fn from(err: HandoffError) -> Self {
        KernelInitError::Handoff(err)
    }
}

impl From<BootInfoError> for KernelInitError {
    fn from(err: BootInfoError) -> Self {
        KernelInitError::BootInfo(err)
    }
}

impl From<PicError> for KernelInitError {
    fn from(err: PicError) -> Self {
        KernelInitError::Pic(err)
    }
}

impl From<TimerError> for KernelInitError {
    fn from(err: TimerError) -> Self {
        KernelInitError::Timer(err)
    }
}

impl From<PagingError> for KernelInitError {
    fn from(err: PagingError) -> Self {
        KernelInitError::Paging(err)
    }
}

pub struct KernelState {
    pub paging: PagingState,
    pub timer: TimerConfig,
}

/// Remaps the controllers, then installs exception gates and IRQ gates at
/// the remapped vectors. Every line stays masked. A rejected remap leaves
/// the table untouched.
fn route_interrupts<P: PortIo>(
    table: &mut InterruptTable,
    pics: &mut ChainedPics<P>,
    config: &KernelConfig,
) -> Result<(), KernelInitError> {
    pics.remap(config.master_base, config.slave_base)?;
    table.reset();
    idt::install(table, &idt::EXCEPTION_BINDINGS);
    idt::install(table, &idt::irq_bindings(pics));
    log::info!(
        "PIC remapped: master {:#x}, slave {:#x}; {} gates installed",
        pics.master_base(),
        pics.slave_base(),
        table.registered()
    );
    Ok(())
}

/// Programs the timer and opens the timer and keyboard lines.
fn start_devices<P: PortIo, Q: PortIo>(
    pit: &mut Pit<P>,
    table: &mut InterruptTable,
    pics: &mut ChainedPics<Q>,
    config: &KernelConfig,
) -> Result<TimerConfig, KernelInitError> {
    let timer = pit.configure(config.timer_hz, table, pics, idt::timer_entry())?;
    pics.unmask(KEYBOARD_IRQ)?;
    Ok(timer)
}

/// Checks the required tags and logs what the loader reported.
fn scan_boot_info(info: &BootInformation<'_>) -> Result<(), BootInfoError> {
    info.validate()?;
    let regions = info.for_each_region(|region| {
        log::debug!(
            "memory {:#014x}..{:#014x} {:?}",
            region.base,
            region.end(),
            region.kind
        );
    })?;
    let sections = info.for_each_section(|section| {
        log::trace!(
            "section {:#018x} size {:#x} flags {:#x}",
            section.addr,
            section.size,
            section.flags
        );
    })?;
    let kernel = info.kernel_span()?;
    let span = info.span();
    log::info!(
        "{} memory regions, {} kernel sections; kernel {:#x}..{:#x}, boot info {:#x}..{:#x}",
        regions,
        sections,
        kernel.start,
        kernel.end,
        span.start,
        span.end
    );
    Ok(())
}

/// Brings the machine from loader handoff to a running timer.
///
/// The table is loaded before the boot information is touched so faults in
/// later stages reach this kernel's handlers. The timer gate is added to the
/// loaded table once memory is in order.
pub fn early_init(
    boot_info: &'static bootloader_api::BootInfo,
    config: &KernelConfig,
) -> Result<KernelState, KernelInitError> {
    interrupts::disable();

    let mut table = idt::storage::claim().ok_or(KernelInitError::TableClaimed)?;
    route_interrupts(&mut table, &mut *PICS.lock(), config)?;
    table.commit();

    let info = handoff::build(boot_info)?;
    scan_boot_info(&info)?;

    let physical_offset = boot_info
        .physical_memory_offset
        .into_option()
        .ok_or(HandoffError::NoPhysicalMapping)?;
    let paging = unsafe { crate::paging::remap_kernel(&info, VirtAddr::new(physical_offset)) }?;

    let timer = start_devices(
        &mut Pit::new(HardwarePorts::new()),
        &mut table,
        &mut *PICS.lock(),
        config,
    )?;

    interrupts::enable();
    log::info!("interrupts enabled, {} gates present", table.registered());

    Ok(KernelState { paging, timer })
}

pub fn kernel_loop(_state: KernelState) -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Reports `error` as `description = code` and stops. Interrupts are left
/// as they are.
pub fn fatal(error: &KernelInitError) -> ! {
    log::error!("{} = {}", error.description(), error.code());
    log::error!("{}", error);
    loop {
        x86_64::instructions::hlt();
    }
}
