//! The byte-stream capability the driver needs from a serial port or GPIB session.

use fugit::MillisDurationU32;

/// A blocking byte stream to the instrument.
///
/// On top of [embedded_io::Read] & [embedded_io::Write] the driver needs to discard buffered
/// bytes and adjust the read timeout. A read that runs out of time must either return `Ok(0)` or
/// an error whose kind is [`embedded_io::ErrorKind::TimedOut`].
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Discard any bytes received but not yet read.
    fn flush_input(&mut self) -> Result<(), Self::Error>;

    /// Discard any bytes written but not yet transmitted.
    fn flush_output(&mut self) -> Result<(), Self::Error>;

    /// Set how long a read blocks before giving up.
    fn set_timeout(&mut self, timeout: MillisDurationU32) -> Result<(), Self::Error>;

    /// The current read timeout.
    fn timeout(&self) -> MillisDurationU32;

    /// Block for `duration`. Used for settle times the protocol requires.
    fn pause(&mut self, duration: MillisDurationU32) {
        std::thread::sleep(std::time::Duration::from_millis(duration.to_millis() as u64));
    }
}
