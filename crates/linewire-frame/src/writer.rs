use bytes::BytesMut;
use linewire_transport::Transport;
use tracing::trace;

use crate::codec::{
    check_payload_size, encode_header, encode_payload_line, needs_separator, Frame, FrameConfig,
    Payload,
};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete frames to a [`Transport`].
///
/// The header and the path or length line go out as one message; memory
/// payloads follow in `chunk_size` pieces, then the separator if needed.
/// Callers sharing a transport must serialize whole frames themselves.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Transport> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        check_payload_size(&frame.payload, self.config.max_payload_size)?;

        self.buf.clear();
        encode_header(&frame.cmd, &frame.msg_id, frame.mode(), &mut self.buf)?;
        encode_payload_line(&frame.payload, &mut self.buf)?;
        self.inner.send(&self.buf)?;

        if let Payload::Mem(bytes) = &frame.payload {
            for chunk in bytes.chunks(self.config.chunk_size.max(1)) {
                self.inner.send(chunk)?;
            }
            if needs_separator(bytes) {
                self.inner.send(b"\n")?;
            }
        }

        trace!(
            transport = self.inner.name(),
            cmd = %frame.cmd,
            msg_id = %frame.msg_id,
            "wrote frame"
        );
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
