use linewire_frame::{FrameConfig, MsgMode};

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Frame assembly and write limits.
    pub frame: FrameConfig,
    /// Mode used by [`Client::send`](crate::Client::send) and friends.
    pub default_mode: MsgMode,
}

impl ClientConfig {
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_default_mode(mut self, mode: MsgMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.frame.chunk_size = chunk_size;
        self
    }
}
