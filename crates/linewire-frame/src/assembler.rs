use std::path::PathBuf;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{needs_separator, Frame, FrameConfig, MsgMode, Payload, MAX_LINE_LEN};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Cmd,
    MsgId,
    Mode,
    FilePath,
    Length,
    Body(usize),
}

/// Rebuilds frames from arbitrarily chunked transport deliveries.
///
/// Bytes are buffered until the field being parsed is complete; one chunk
/// may finish zero, one or several frames. A malformed frame resets the
/// assembler and drops everything buffered.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    state: State,
    cmd: String,
    msg_id: String,
    // The previous memory body did not end with `\n`, so the sender added one.
    skip_separator: bool,
    config: FrameConfig,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::Cmd,
            cmd: String::new(),
            msg_id: String::new(),
            skip_separator: false,
            config,
        }
    }

    /// Append a chunk and return every frame it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            match self.step() {
                Ok(Some(frame)) => {
                    debug!(
                        cmd = %frame.cmd,
                        msg_id = %frame.msg_id,
                        mode = %frame.mode(),
                        "assembled frame"
                    );
                    frames.push(frame);
                }
                Ok(None) => return Ok(frames),
                Err(err) => {
                    warn!(error = %err, dropped = self.buf.len(), "resetting frame assembler");
                    self.reset();
                    return Err(err);
                }
            }
        }
    }

    /// Drop any partial frame and buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = State::Cmd;
        self.cmd.clear();
        self.msg_id.clear();
        self.skip_separator = false;
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when no partial frame is pending.
    pub fn is_idle(&self) -> bool {
        self.state == State::Cmd && self.buf.is_empty()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn step(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::Cmd => {
                    if self.skip_separator {
                        let Some(&first) = self.buf.first() else {
                            return Ok(None);
                        };
                        if first == b'\n' {
                            self.buf.advance(1);
                        }
                        self.skip_separator = false;
                    }
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    self.cmd = line;
                    self.state = State::MsgId;
                }
                State::MsgId => {
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    self.msg_id = line;
                    self.state = State::Mode;
                }
                State::Mode => {
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    self.state = match MsgMode::from_wire(&line) {
                        MsgMode::File => State::FilePath,
                        MsgMode::Mem => State::Length,
                    };
                }
                State::FilePath => {
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        return Err(FrameError::InvalidHeader("empty file path".to_string()));
                    }
                    return Ok(Some(self.emit(Payload::File(PathBuf::from(line)))));
                }
                State::Length => {
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    let len: usize = line.parse().map_err(|_| FrameError::InvalidLength(line))?;
                    if len > self.config.max_payload_size {
                        return Err(FrameError::PayloadTooLarge {
                            size: len,
                            max: self.config.max_payload_size,
                        });
                    }
                    self.state = State::Body(len);
                }
                State::Body(len) => {
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let body = self.buf.split_to(len).freeze();
                    self.skip_separator = needs_separator(&body);
                    return Ok(Some(self.emit(Payload::Mem(body))));
                }
            }
        }
    }

    /// Take one `\n`-terminated line, or `None` if it is not complete yet.
    fn take_line(&mut self) -> Result<Option<String>> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > MAX_LINE_LEN {
                return Err(FrameError::InvalidHeader(format!(
                    "line exceeds {MAX_LINE_LEN} bytes"
                )));
            }
            return Ok(None);
        };
        let line = self.buf.split_to(pos + 1);
        String::from_utf8(line[..pos].to_vec())
            .map(Some)
            .map_err(|_| FrameError::InvalidHeader("header line is not UTF-8".to_string()))
    }

    fn emit(&mut self, payload: Payload) -> Frame {
        self.state = State::Cmd;
        Frame {
            cmd: std::mem::take(&mut self.cmd),
            msg_id: std::mem::take(&mut self.msg_id),
            payload,
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
