//! `log` backend writing to COM1.
//!
//! Lines look like `[INFO ] pit           : PIT: 100 Hz requested, ...`.

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Metadata, Record};
use x86_64::instructions::interrupts;

use crate::serial::SERIAL;

#[cfg(feature = "verbose")]
const MAX_LEVEL: LevelFilter = LevelFilter::Trace;
#[cfg(not(feature = "verbose"))]
const MAX_LEVEL: LevelFilter = LevelFilter::Info;

const TARGET_WIDTH: usize = 14;

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

/// Last path segment of a module target, so `hwinit::kernel::idt::handlers`
/// prints as `handlers`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn write_line<W: Write>(
    out: &mut W,
    level: Level,
    target: &str,
    args: fmt::Arguments<'_>,
) -> fmt::Result {
    writeln!(
        out,
        "[{:<5}] {:<width$}: {}",
        level.as_str(),
        short_target(target),
        args,
        width = TARGET_WIDTH
    )
}

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= MAX_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Handlers log too; holding the lock with IF set could deadlock.
        interrupts::without_interrupts(|| {
            let mut serial = SERIAL.lock();
            let _ = write_line(&mut *serial, record.level(), record.target(), *record.args());
        });
    }

    fn flush(&self) {}
}

/// Brings up COM1 and installs the logger. Only the first call succeeds.
pub fn init() -> Result<(), log::SetLoggerError> {
    interrupts::without_interrupts(|| SERIAL.lock().init());
    log::set_logger(&LOGGER).map(|()| log::set_max_level(MAX_LEVEL))
}
