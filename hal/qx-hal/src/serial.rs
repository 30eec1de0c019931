//! Serial byte stream abstractions
//!
//! A QX port is any link that moves raw bytes in order: a UART, or a BLE
//! characteristic pair used as a byte pipe. Transmit is synchronous and
//! reports failure instead of retrying; receive is polled and never blocks.

/// Serial transmitter
pub trait SerialTx {
    /// Error type for transmit operations
    type Error;

    /// Queue a complete buffer for transmission
    ///
    /// Returns once every byte has been accepted by the link or an error
    /// occurred. Partial writes are reported as errors.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Serial receiver
pub trait SerialRx {
    /// Error type for receive operations
    type Error;

    /// Copy whatever bytes are already available into `buf`
    ///
    /// Returns the number of bytes copied, which is zero when the link is
    /// idle. Must not wait for more data to arrive.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}
