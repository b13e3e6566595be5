//! 8253/8254 PIT (Programmable Interval Timer) channel 0.
//!
//! Drives IRQ 0 at a programmable rate, square wave.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::kernel::idt::InterruptTable;
use crate::port::PortIo;

use super::pic::{ChainedPics, PicError, PicState, IRQ_TIMER};

const CH0_DATA: u16 = 0x40;
const CMD: u16 = 0x43;

/// PIT input clock in Hz.
pub const PIT_BASE_HZ: u32 = 1_193_180;

const CHANNEL_0: u8 = 0b00 << 6;
const ACCESS_LOHI: u8 = 0b11 << 4;
const MODE_SQUARE_WAVE: u8 = 0b011 << 1;
const BINARY: u8 = 0;

/// A diagnostic line is logged once per this many ticks.
pub const TICK_REPORT_PERIOD: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    ZeroFrequency,
    /// Above the input clock; the divisor would truncate to 0.
    FrequencyTooHigh { hz: u32 },
    /// Divisor does not fit the 16-bit reload register.
    FrequencyTooLow { hz: u32 },
    Pic(PicError),
}

impl TimerError {
    pub fn description(&self) -> &'static str {
        match self {
            Self::ZeroFrequency => "timer frequency is zero",
            Self::FrequencyTooHigh { .. } => "timer frequency above PIT input clock",
            Self::FrequencyTooLow { .. } => "timer frequency below PIT minimum",
            Self::Pic(_) => "interrupt controller refused timer line",
        }
    }
}

impl core::fmt::Display for TimerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FrequencyTooHigh { hz } | Self::FrequencyTooLow { hz } => {
                write!(f, "{}: {} Hz", self.description(), hz)
            }
            Self::Pic(err) => write!(f, "{}: {}", self.description(), err),
            Self::ZeroFrequency => write!(f, "{}", self.description()),
        }
    }
}

impl From<PicError> for TimerError {
    fn from(err: PicError) -> Self {
        TimerError::Pic(err)
    }
}

/// Channel 0 programming for a target rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub target_hz: u32,
    pub divisor: u16,
}

impl TimerConfig {
    /// `divisor = PIT_BASE_HZ / hz`, truncated.
    pub fn for_frequency(hz: u32) -> Result<Self, TimerError> {
        if hz == 0 {
            return Err(TimerError::ZeroFrequency);
        }
        if hz > PIT_BASE_HZ {
            return Err(TimerError::FrequencyTooHigh { hz });
        }
        let divisor = PIT_BASE_HZ / hz;
        let divisor = u16::try_from(divisor).map_err(|_| TimerError::FrequencyTooLow { hz })?;
        Ok(TimerConfig { target_hz: hz, divisor })
    }

    /// Channel 0, lobyte/hibyte, mode 3, binary.
    pub const fn command_byte(&self) -> u8 {
        CHANNEL_0 | ACCESS_LOHI | MODE_SQUARE_WAVE | BINARY
    }

    /// Rate the chip really produces after truncation.
    pub fn actual_hz(&self) -> u32 {
        PIT_BASE_HZ / self.divisor as u32
    }
}

/// Monotonic tick count owned by the timer handler.
pub struct TickCounter(AtomicU64);

impl TickCounter {
    pub const fn new() -> Self {
        TickCounter(AtomicU64::new(0))
    }

    /// Counts one tick; returns the new count when a report is due.
    pub fn tick(&self) -> Option<u64> {
        let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        if n & (TICK_REPORT_PERIOD - 1) == 0 {
            Some(n)
        } else {
            None
        }
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub static TICKS: TickCounter = TickCounter::new();

pub struct Pit<P: PortIo> {
    ports: P,
}

impl<P: PortIo> Pit<P> {
    pub const fn new(ports: P) -> Self {
        Pit { ports }
    }

    /// Programs channel 0, installs `handler` at the timer vector and
    /// unmasks IRQ 0.
    ///
    /// The controllers must already be remapped. Call with interrupts
    /// disabled. On error nothing is written and no gate is installed.
    pub fn configure<Q: PortIo>(
        &mut self,
        target_hz: u32,
        table: &mut InterruptTable,
        pics: &mut ChainedPics<Q>,
        handler: u64,
    ) -> Result<TimerConfig, TimerError> {
        let config = TimerConfig::for_frequency(target_hz)?;
        if pics.state() != PicState::Masked {
            return Err(PicError::NotRemapped.into());
        }

        self.ports.write_u8(CMD, config.command_byte());
        let [lo, hi] = config.divisor.to_le_bytes();
        self.ports.write_u8(CH0_DATA, lo);
        self.ports.write_u8(CH0_DATA, hi);

        table.register(pics.vector_for(IRQ_TIMER), handler);
        pics.unmask(IRQ_TIMER)?;

        log::info!(
            "PIT: {} Hz requested, divisor {}, actual {} Hz",
            target_hz,
            config.divisor,
            config.actual_hz()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::fake::FakePorts;

    #[test]
    fn divisor_truncates() {
        let cases = [(100, 11931), (1000, 1193), (PIT_BASE_HZ, 1)];
        for (hz, divisor) in cases {
            assert_eq!(TimerConfig::for_frequency(hz).unwrap().divisor, divisor);
        }
    }

    #[test]
    fn out_of_range_frequencies_are_rejected() {
        assert_eq!(TimerConfig::for_frequency(0), Err(TimerError::ZeroFrequency));
        assert_eq!(
            TimerConfig::for_frequency(PIT_BASE_HZ + 1),
            Err(TimerError::FrequencyTooHigh { hz: PIT_BASE_HZ + 1 })
        );
        assert_eq!(
            TimerConfig::for_frequency(18),
            Err(TimerError::FrequencyTooLow { hz: 18 })
        );
        assert_eq!(TimerConfig::for_frequency(19).unwrap().divisor, 62798);
    }

    #[test]
    fn command_byte_is_channel0_lohi_square() {
        assert_eq!(TimerConfig::for_frequency(100).unwrap().command_byte(), 0x36);
    }

    #[test]
    fn configure_programs_chip_then_installs_irq0() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.remap(0x20, 0x28).unwrap();
        ports.clear_log();

        let mut table = InterruptTable::new();
        let mut pit = Pit::new(ports.clone());
        let config = pit.configure(1000, &mut table, &mut pics, 0xFFFF_8000_0000_4000).unwrap();
        assert_eq!(config.divisor, 1193);

        // 1193 = 0x04A9
        assert_eq!(
            ports.writes(),
            vec![(CMD, 0x36), (CH0_DATA, 0xA9), (CH0_DATA, 0x04), (0x21, 0xFE)]
        );
        let gate = table.entry(0x20);
        assert!(gate.options().is_present());
        assert_eq!(gate.handler_address(), 0xFFFF_8000_0000_4000);
        assert_eq!(pics.masks(), (0xFE, 0xFF));
    }

    #[test]
    fn configure_with_bad_rate_touches_nothing() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.remap(0x20, 0x28).unwrap();
        ports.clear_log();

        let mut table = InterruptTable::new();
        let mut pit = Pit::new(ports.clone());
        let err = pit.configure(2_000_000, &mut table, &mut pics, 0x1000);
        assert_eq!(err, Err(TimerError::FrequencyTooHigh { hz: 2_000_000 }));
        assert!(ports.writes().is_empty());
        assert_eq!(table.registered(), 0);
    }

    #[test]
    fn configure_before_remap_touches_nothing() {
        let ports = FakePorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        let mut table = InterruptTable::new();
        let mut pit = Pit::new(ports.clone());

        let err = pit.configure(100, &mut table, &mut pics, 0x1000);
        assert_eq!(err, Err(TimerError::Pic(PicError::NotRemapped)));
        assert!(ports.writes().is_empty());
        assert_eq!(table.registered(), 0);
    }

    #[test]
    fn report_fires_on_4096th_tick_only() {
        let counter = TickCounter::new();
        let mut reports = Vec::new();
        for i in 1..=4097u64 {
            if let Some(n) = counter.tick() {
                reports.push((i, n));
            }
        }
        assert_eq!(reports, vec![(4096, 4096)]);
        assert_eq!(counter.get(), 4097);
    }

    #[test]
    fn report_repeats_every_period() {
        let counter = TickCounter::new();
        let reports = (0..3 * TICK_REPORT_PERIOD)
            .filter_map(|_| counter.tick())
            .collect::<Vec<_>>();
        assert_eq!(reports, vec![4096, 8192, 12288]);
    }
}
