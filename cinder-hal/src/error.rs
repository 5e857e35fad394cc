/// Driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The driver is servicing another operation.
    Busy,
    /// The operation did not complete within its deadline.
    Timeout,
    /// A parameter is out of range or inconsistent with the current
    /// configuration.
    InvalidParam,
    /// The peripheral reported a hardware error. Details are available
    /// through the driver's error accessor.
    Hardware,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Busy => write!(f, "driver busy"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::InvalidParam => write!(f, "invalid parameter"),
            Error::Hardware => write!(f, "hardware error"),
        }
    }
}

impl core::error::Error for Error {}

/// Driver result.
pub type Result<T> = core::result::Result<T, Error>;
