//! Transport seam between the protocol engine and the host platform.
//!
//! Serial-port discovery and configuration stay on the host side; the
//! driver only needs a byte stream plus an identity string it can log
//! and compare across hot-plug cycles. Tests hand in
//! `tokio::io::duplex` pipes.

use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// Byte-stream requirements for a BGAPI link.
pub trait TransportIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportIo for T {}

/// A serial-style link to a BGAPI adapter.
pub struct Transport {
    identity: String,
    io: Box<dyn TransportIo>,
}

impl Transport {
    /// Wrap an async byte stream. `identity` is typically the serial
    /// port path or the adapter serial number.
    pub fn new(identity: impl Into<String>, io: impl TransportIo + 'static) -> Self {
        Self {
            identity: identity.into(),
            io: Box::new(io),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Split into the halves the reader task and the command channel own.
    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        ReadHalf<Box<dyn TransportIo>>,
        WriteHalf<Box<dyn TransportIo>>,
    ) {
        let (read_half, write_half) = tokio::io::split(self.io);
        (self.identity, read_half, write_half)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_transport_split_carries_bytes() {
        let (near, mut far) = tokio::io::duplex(64);
        let transport = Transport::new("duplex-0", near);
        assert_eq!(transport.identity(), "duplex-0");

        let (identity, mut read_half, mut write_half) = transport.into_parts();
        assert_eq!(identity, "duplex-0");

        write_half.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        far.write_all(b"pong").await.unwrap();
        read_half.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
