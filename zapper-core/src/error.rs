use thiserror::Error;

/// Errors produced by the capture and transmit paths.
///
/// A capture that matches no known protocol is *not* an error; it decodes to
/// [`crate::signal::Protocol::Raw`] with the pulse train kept for replay.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The monotonic timer could not be brought up. Fatal at init.
    #[error("monotonic clock unavailable")]
    ClockUnavailable,

    /// A second edge subscriber was registered before the first was removed.
    #[error("edge subscriber already registered")]
    AlreadyRegistered,

    /// Capture session ended with too few pulses to be a signal.
    #[error("capture too short ({0} pulses), probably noise")]
    CaptureTooShort(usize),

    /// The capture buffer filled before the line went idle.
    #[error("capture buffer overflow, signal truncated")]
    CaptureOverflow,

    /// No complete signal arrived within the caller's deadline.
    #[error("capture timed out")]
    CaptureTimeout,

    /// The edge stream closed (source dropped or shut down).
    #[error("edge source closed")]
    SourceClosed,

    /// A transmission is already armed or in flight.
    #[error("transmit line busy")]
    LineBusy,

    /// The job was rejected before touching the hardware.
    #[error("invalid transmit job: {0}")]
    InvalidJob(&'static str),

    /// The registry holds no signal under the requested name.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// Registry backend failure.
    #[error("registry: {0}")]
    Registry(String),

    /// GPIO backend failure (daemon unreachable, pin setup rejected).
    #[error("gpio backend: {0}")]
    Gpio(String),
}
