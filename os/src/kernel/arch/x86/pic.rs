//! 8259 PIC (Programmable Interrupt Controller), master/slave cascade.
//!
//! `remap` moves IRQ 0-7 and 8-15 off the CPU exception vectors and leaves
//! every line masked. Lines are then enabled one at a time.

use spin::Mutex;

use crate::port::{io_wait, HardwarePorts, PortIo};

const MASTER_CMD: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_CMD: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11; // edge triggered, cascade, ICW4 follows
const ICW4_8086: u8 = 0x01;
const MASTER_CASCADE: u8 = 0x04; // slave on IR2
const SLAVE_CASCADE: u8 = 0x02; // cascade identity
const EOI: u8 = 0x20;
const ALL_MASKED: u8 = 0xFF;

pub const IRQ_TIMER: u8 = 0;
pub const KEYBOARD_IRQ: u8 = 1;
pub const CASCADE_IRQ: u8 = 2;
pub const IRQ_LINES: u8 = 16;

/// Lowest vector a controller may be based at; 0..32 belong to the CPU.
const RESERVED_VECTORS: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Master,
    Slave,
}

impl Controller {
    fn command_port(self) -> u16 {
        match self {
            Controller::Master => MASTER_CMD,
            Controller::Slave => SLAVE_CMD,
        }
    }

    fn data_port(self) -> u16 {
        match self {
            Controller::Master => MASTER_DATA,
            Controller::Slave => SLAVE_DATA,
        }
    }

    /// Controller owning `irq` and the bit of that line in its mask.
    fn for_line(irq: u8) -> (Self, u8) {
        if irq < 8 {
            (Controller::Master, irq)
        } else {
            (Controller::Slave, irq - 8)
        }
    }
}

/// Progress through the initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PicState {
    Uninitialized,
    InitSequenceSent,
    VectorBasesAssigned,
    CascadeConfigured,
    /// Steady state: initialized, lines masked unless explicitly enabled.
    Masked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicError {
    /// Base overlaps the CPU exception vectors 0..32.
    ReservedRange { base: u8 },
    /// Base is not a multiple of 8 (ICW2 ignores the low three bits).
    Misaligned { base: u8 },
    /// Master and slave vector ranges intersect.
    Overlap { master: u8, slave: u8 },
    /// Line number outside 0..16.
    InvalidLine { irq: u8 },
    /// Mask change requested before `remap` completed.
    NotRemapped,
}

impl PicError {
    pub fn description(&self) -> &'static str {
        match self {
            Self::ReservedRange { .. } => "vector base inside CPU exception range",
            Self::Misaligned { .. } => "vector base not a multiple of 8",
            Self::Overlap { .. } => "master and slave vector ranges overlap",
            Self::InvalidLine { .. } => "IRQ line out of range",
            Self::NotRemapped => "controllers not remapped yet",
        }
    }
}

impl core::fmt::Display for PicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReservedRange { base } | Self::Misaligned { base } => {
                write!(f, "{}: {:#04x}", self.description(), base)
            }
            Self::Overlap { master, slave } => {
                write!(f, "{}: {:#04x}/{:#04x}", self.description(), master, slave)
            }
            Self::InvalidLine { irq } => write!(f, "{}: {}", self.description(), irq),
            Self::NotRemapped => write!(f, "{}", self.description()),
        }
    }
}

fn check_base(base: u8) -> Result<(), PicError> {
    if base < RESERVED_VECTORS {
        return Err(PicError::ReservedRange { base });
    }
    if base % 8 != 0 {
        return Err(PicError::Misaligned { base });
    }
    Ok(())
}

/// The cascaded controller pair.
pub struct ChainedPics<P: PortIo> {
    ports: P,
    master_base: u8,
    slave_base: u8,
    state: PicState,
}

impl<P: PortIo> ChainedPics<P> {
    pub const fn new(ports: P) -> Self {
        ChainedPics {
            ports,
            master_base: 0,
            slave_base: 0,
            state: PicState::Uninitialized,
        }
    }

    pub fn state(&self) -> PicState {
        self.state
    }

    pub fn master_base(&self) -> u8 {
        self.master_base
    }

    pub fn slave_base(&self) -> u8 {
        self.slave_base
    }

    /// CPU vector of `irq` once remapped.
    pub fn vector_for(&self, irq: u8) -> u8 {
        match Controller::for_line(irq) {
            (Controller::Master, bit) => self.master_base + bit,
            (Controller::Slave, bit) => self.slave_base + bit,
        }
    }

    /// Runs the ICW1-ICW4 sequence on both controllers and masks every line.
    ///
    /// Bases are validated before any port is touched.
    pub fn remap(&mut self, master_base: u8, slave_base: u8) -> Result<(), PicError> {
        check_base(master_base)?;
        check_base(slave_base)?;
        if master_base == slave_base {
            return Err(PicError::Overlap { master: master_base, slave: slave_base });
        }

        self.state = PicState::Uninitialized;

        self.send(MASTER_CMD, ICW1_INIT);
        self.send(SLAVE_CMD, ICW1_INIT);
        self.state = PicState::InitSequenceSent;

        self.send(MASTER_DATA, master_base);
        self.send(SLAVE_DATA, slave_base);
        self.master_base = master_base;
        self.slave_base = slave_base;
        self.state = PicState::VectorBasesAssigned;

        self.send(MASTER_DATA, MASTER_CASCADE);
        self.send(SLAVE_DATA, SLAVE_CASCADE);
        self.state = PicState::CascadeConfigured;

        self.send(MASTER_DATA, ICW4_8086);
        self.send(SLAVE_DATA, ICW4_8086);

        self.ports.write_u8(MASTER_DATA, ALL_MASKED);
        self.ports.write_u8(SLAVE_DATA, ALL_MASKED);
        self.state = PicState::Masked;

        log::debug!(
            "PIC remapped: master {:#04x}, slave {:#04x}, all lines masked",
            master_base,
            slave_base
        );
        Ok(())
    }

    fn send(&mut self, port: u16, value: u8) {
        self.ports.write_u8(port, value);
        io_wait(&mut self.ports);
    }

    fn check_line(&self, irq: u8) -> Result<(), PicError> {
        if irq >= IRQ_LINES {
            return Err(PicError::InvalidLine { irq });
        }
        if self.state != PicState::Masked {
            return Err(PicError::NotRemapped);
        }
        Ok(())
    }

    fn update_mask(&mut self, controller: Controller, f: impl FnOnce(u8) -> u8) {
        let port = controller.data_port();
        let current = self.ports.read_u8(port);
        self.ports.write_u8(port, f(current));
    }

    /// Enables delivery of `irq`. A slave line also opens the cascade line.
    pub fn unmask(&mut self, irq: u8) -> Result<(), PicError> {
        self.check_line(irq)?;
        let (controller, bit) = Controller::for_line(irq);
        self.update_mask(controller, |mask| mask & !(1 << bit));
        if controller == Controller::Slave {
            self.update_mask(Controller::Master, |mask| mask & !(1 << CASCADE_IRQ));
        }
        log::trace!("IRQ {} unmasked", irq);
        Ok(())
    }

    pub fn mask(&mut self, irq: u8) -> Result<(), PicError> {
        self.check_line(irq)?;
        let (controller, bit) = Controller::for_line(irq);
        self.update_mask(controller, |mask| mask | (1 << bit));
        log::trace!("IRQ {} masked", irq);
        Ok(())
    }

    /// Current (master, slave) mask registers.
    pub fn masks(&mut self) -> (u8, u8) {
        (self.ports.read_u8(MASTER_DATA), self.ports.read_u8(SLAVE_DATA))
    }

    /// Signals end of interrupt to one controller. Without it the
    /// controller stops delivering that line.
    pub fn acknowledge(&mut self, controller: Controller) {
        self.ports.write_u8(controller.command_port(), EOI);
    }

    /// EOI for `irq`: slave lines need both controllers.
    pub fn end_of_interrupt(&mut self, irq: u8) {
        if irq >= 8 {
            self.acknowledge(Controller::Slave);
        }
        self.acknowledge(Controller::Master);
    }

    pub fn acknowledge_all(&mut self) {
        self.acknowledge(Controller::Master);
        self.acknowledge(Controller::Slave);
    }
}

/// The machine's controllers. Lock with interrupts disabled outside handlers.
pub static PICS: Mutex<ChainedPics<HardwarePorts>> =
    Mutex::new(ChainedPics::new(HardwarePorts::new()));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::fake::FakePorts;

    fn remapped() -> (ChainedPics<FakePorts>, FakePorts) {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.remap(0x20, 0x28).unwrap();
        ports.clear_log();
        (pics, ports)
    }

    #[test]
    fn remap_sends_init_sequence_in_order() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.remap(0x20, 0x28).unwrap();

        assert_eq!(
            ports.writes(),
            vec![
                (MASTER_CMD, 0x11),
                (SLAVE_CMD, 0x11),
                (MASTER_DATA, 0x20),
                (SLAVE_DATA, 0x28),
                (MASTER_DATA, 0x04),
                (SLAVE_DATA, 0x02),
                (MASTER_DATA, 0x01),
                (SLAVE_DATA, 0x01),
                (MASTER_DATA, 0xFF),
                (SLAVE_DATA, 0xFF),
            ]
        );
        assert_eq!(pics.state(), PicState::Masked);
    }

    #[test]
    fn remap_masks_everything_regardless_of_prior_state() {
        let ports = FakePorts::new();
        ports.preset(MASTER_DATA, 0x00);
        ports.preset(SLAVE_DATA, 0x5A);
        let mut pics = ChainedPics::new(ports.clone());
        pics.remap(0x30, 0x38).unwrap();
        assert_eq!(pics.masks(), (0xFF, 0xFF));
    }

    #[test]
    fn remap_rejects_bad_bases_without_io() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());

        assert_eq!(pics.remap(0x08, 0x28), Err(PicError::ReservedRange { base: 0x08 }));
        assert_eq!(pics.remap(0x20, 0x18), Err(PicError::ReservedRange { base: 0x18 }));
        assert_eq!(pics.remap(0x21, 0x28), Err(PicError::Misaligned { base: 0x21 }));
        assert_eq!(
            pics.remap(0x20, 0x20),
            Err(PicError::Overlap { master: 0x20, slave: 0x20 })
        );
        assert!(ports.writes().is_empty());
        assert_eq!(pics.state(), PicState::Uninitialized);
    }

    #[test]
    fn unmask_before_remap_is_refused() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        assert_eq!(pics.unmask(0), Err(PicError::NotRemapped));
        assert_eq!(pics.mask(0), Err(PicError::NotRemapped));
        assert!(ports.writes().is_empty());
    }

    #[test]
    fn unmask_and_mask_preserve_other_lines() {
        let (mut pics, ports) = remapped();
        pics.unmask(0).unwrap();
        pics.unmask(1).unwrap();
        assert_eq!(pics.masks(), (0xFC, 0xFF));

        pics.mask(0).unwrap();
        assert_eq!(pics.masks(), (0xFD, 0xFF));
        assert_eq!(ports.writes_to(MASTER_DATA), vec![0xFE, 0xFC, 0xFD]);
    }

    #[test]
    fn slave_line_opens_cascade() {
        let (mut pics, _ports) = remapped();
        pics.unmask(12).unwrap();
        assert_eq!(pics.masks(), (0xFB, 0xEF));
    }

    #[test]
    fn invalid_line_is_refused() {
        let (mut pics, ports) = remapped();
        assert_eq!(pics.unmask(16), Err(PicError::InvalidLine { irq: 16 }));
        assert!(ports.writes().is_empty());
    }

    #[test]
    fn end_of_interrupt_targets_owner() {
        let (mut pics, ports) = remapped();
        pics.end_of_interrupt(3);
        assert_eq!(ports.writes(), vec![(MASTER_CMD, EOI)]);

        ports.clear_log();
        pics.end_of_interrupt(9);
        assert_eq!(ports.writes(), vec![(SLAVE_CMD, EOI), (MASTER_CMD, EOI)]);

        ports.clear_log();
        pics.acknowledge_all();
        assert_eq!(ports.writes(), vec![(MASTER_CMD, EOI), (SLAVE_CMD, EOI)]);
    }

    #[test]
    fn vectors_follow_bases() {
        let (pics, _ports) = remapped();
        assert_eq!(pics.vector_for(IRQ_TIMER), 0x20);
        assert_eq!(pics.vector_for(KEYBOARD_IRQ), 0x21);
        assert_eq!(pics.vector_for(8), 0x28);
        assert_eq!(pics.vector_for(15), 0x2F);
    }
}
