//! Real-time safe logging for the meter.
//!
//! With the `debug` feature, `meter_log!` formats into a fixed-size entry and
//! hands it to a `ringbuf` queue without blocking or allocating. Entries are
//! forwarded to the `log` facade by `drain_log`, which must run off the audio
//! thread. Without the feature everything compiles away.

use std::fmt;

#[cfg(feature = "debug")]
pub mod logger {
    use ringbuf::{Consumer, Producer, RingBuffer};
    use std::fmt;
    use std::sync::{Mutex, OnceLock};

    const LOG_CAP: usize = 128;
    const LOG_MSG_MAX: usize = 256;

    #[derive(Copy, Clone)]
    struct LogEntry {
        len: u16,
        bytes: [u8; LOG_MSG_MAX],
    }

    impl Default for LogEntry {
        fn default() -> Self {
            Self {
                len: 0,
                bytes: [0; LOG_MSG_MAX],
            }
        }
    }

    impl LogEntry {
        fn as_str(&self) -> &str {
            std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("<invalid>")
        }
    }

    impl fmt::Write for LogEntry {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let len = self.len as usize;
            let avail = LOG_MSG_MAX - len;
            // Cut on a char boundary so the entry stays valid UTF-8
            let mut n = s.len().min(avail);
            while !s.is_char_boundary(n) {
                n -= 1;
            }
            self.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.len = (len + n) as u16;
            Ok(())
        }
    }

    struct LogRing {
        producer: Mutex<Producer<LogEntry>>,
        consumer: Mutex<Consumer<LogEntry>>,
    }

    static LOGGER: OnceLock<LogRing> = OnceLock::new();

    pub fn init_logger() {
        let _ = LOGGER.get_or_init(|| {
            let (producer, consumer) = RingBuffer::<LogEntry>::new(LOG_CAP).split();
            LogRing {
                producer: Mutex::new(producer),
                consumer: Mutex::new(consumer),
            }
        });
    }

    /// Drops the message when the logger is missing, busy or full.
    pub fn log_args(args: fmt::Arguments) {
        let Some(ring) = LOGGER.get() else {
            return;
        };

        let mut entry = LogEntry::default();
        let _ = fmt::write(&mut entry, args);
        if entry.len == 0 {
            return;
        }

        if let Ok(mut producer) = ring.producer.try_lock() {
            let _ = producer.push(entry);
        }
    }

    pub fn drain() -> usize {
        let Some(ring) = LOGGER.get() else {
            return 0;
        };
        let Ok(mut consumer) = ring.consumer.lock() else {
            return 0;
        };

        let mut drained = 0;
        while let Some(entry) = consumer.pop() {
            log::info!(target: "levelmeter::audio", "{}", entry.as_str());
            drained += 1;
        }
        drained
    }

}

#[cfg(feature = "debug")]
pub(crate) fn meter_log_inner(args: fmt::Arguments) {
    logger::log_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn meter_log_inner(_args: fmt::Arguments) {}

#[cfg(feature = "debug")]
pub(crate) fn init_log() {
    logger::init_logger();
}

#[cfg(not(feature = "debug"))]
pub(crate) fn init_log() {}

/// Forwards queued audio-thread messages to `log`.
#[cfg(feature = "debug")]
pub(crate) fn drain_log() {
    logger::drain();
}

#[cfg(not(feature = "debug"))]
pub(crate) fn drain_log() {}

#[macro_export]
macro_rules! meter_log {
    ($($arg:tt)*) => {
        $crate::debug::meter_log_inner(format_args!($($arg)*))
    };
}
