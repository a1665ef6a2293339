use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use spin::RwLock;

#[cfg(feature = "debug_verbose")]
const DEFAULT_LEVEL: LogLevel = LogLevel::DEBUG;
#[cfg(not(feature = "debug_verbose"))]
const DEFAULT_LEVEL: LogLevel = LogLevel::INFO;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LEVEL.priority());
static OUTPUT_ENABLED: AtomicBool = AtomicBool::new(true);
static SINK: RwLock<Option<LogSink>> = RwLock::new(None);
static CLOCK: RwLock<Option<ClockSource>> = RwLock::new(None);

/// Receives every emitted line: level, timestamp in microseconds, message.
pub type LogSink = fn(LogLevel, u64, fmt::Arguments<'_>);

/// Monotonic microsecond clock used to stamp log lines.
pub type ClockSource = fn() -> u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    PANIC,
    FATAL,
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::PANIC => "PANIC",
            LogLevel::FATAL => "FATAL",
            LogLevel::ERROR => "ERROR",
            LogLevel::WARN => "WARN",
            LogLevel::INFO => "INFO",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::TRACE => "TRACE",
        }
    }

    fn serial_color(self) -> &'static str {
        match self {
            LogLevel::PANIC => "\x1b[1;37;41m",
            LogLevel::FATAL => "\x1b[1;37;41m",
            LogLevel::ERROR => "\x1b[1;31m",
            LogLevel::WARN => "\x1b[33m",
            LogLevel::INFO => "\x1b[32m",
            LogLevel::DEBUG => "\x1b[36m",
            LogLevel::TRACE => "\x1b[90m",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            LogLevel::PANIC => 0,
            LogLevel::FATAL => 1,
            LogLevel::ERROR => 2,
            LogLevel::WARN => 3,
            LogLevel::INFO => 4,
            LogLevel::DEBUG => 5,
            LogLevel::TRACE => 6,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::PANIC,
            1 => LogLevel::FATAL,
            2 => LogLevel::ERROR,
            3 => LogLevel::WARN,
            4 => LogLevel::INFO,
            5 => LogLevel::DEBUG,
            _ => LogLevel::TRACE,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("panic") {
            Some(LogLevel::PANIC)
        } else if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::FATAL)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::ERROR)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::WARN)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::INFO)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::DEBUG)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::TRACE)
        } else {
            None
        }
    }
}

/// Install the output sink. Replaces any previously installed sink.
pub fn set_sink(sink: LogSink) {
    *SINK.write() = Some(sink);
}

/// Remove the output sink; lines are dropped until a new one is installed.
pub fn clear_sink() {
    *SINK.write() = None;
}

/// Install the timestamp source (usually the platform tick converted to us).
pub fn set_clock(clock: ClockSource) {
    *CLOCK.write() = Some(clock);
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    let current = LOG_LEVEL.load(Ordering::Relaxed);
    if level.priority() > current {
        return;
    }
    if !should_emit(level) {
        return;
    }

    let timestamp_us = boot_time_us();

    // Copy the fn pointer out so a sink that logs again cannot deadlock.
    let sink = *SINK.read();
    match sink {
        Some(sink) => sink(level, timestamp_us, args),
        None => emit_default(level, timestamp_us, args),
    }
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level.priority() <= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

pub fn boot_time_us() -> u64 {
    let clock = *CLOCK.read();
    clock.map(|now| now()).unwrap_or(0)
}

/// Silence everything below ERROR, e.g. while a latency-sensitive path runs.
pub fn set_output_enabled(enabled: bool) {
    OUTPUT_ENABLED.store(enabled, Ordering::Relaxed);
}

fn should_emit(level: LogLevel) -> bool {
    if OUTPUT_ENABLED.load(Ordering::Relaxed) {
        true
    } else {
        level.priority() <= LogLevel::ERROR.priority()
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none", feature = "serial_log"))]
fn emit_default(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
    crate::serial::_print(format_args!("{}", LogLine::new(level, timestamp_us, args)));
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none", feature = "serial_log")))]
fn emit_default(_level: LogLevel, _timestamp_us: u64, _args: fmt::Arguments<'_>) {}

/// One fully formatted, colored log line including the trailing newline.
///
/// Sinks that write to a terminal can print this directly.
pub struct LogLine<'a> {
    level: LogLevel,
    timestamp_us: u64,
    args: fmt::Arguments<'a>,
}

impl<'a> LogLine<'a> {
    pub fn new(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'a>) -> Self {
        Self {
            level,
            timestamp_us,
            args,
        }
    }
}

impl fmt::Display for LogLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{color}[{timestamp}] [{level}] {message}\x1b[0m\n",
            color = self.level.serial_color(),
            timestamp = TimestampDisplay {
                microseconds: self.timestamp_us
            },
            level = LevelDisplay(self.level),
            message = self.args,
        )
    }
}

struct TimestampDisplay {
    microseconds: u64,
}

impl fmt::Display for TimestampDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.microseconds / 1_000_000;
        let micros = self.microseconds % 1_000_000;
        write!(f, "{:>5}.{:06}", seconds, micros)
    }
}

struct LevelDisplay(LogLevel);

impl fmt::Display for LevelDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5}", self.0.as_str())
    }
}
