//! Decoder configuration, fixed at construction.

/// I/O buffer size used when no block size is configured (a cache page)
pub const DEFAULT_IO_BUFFER_SIZE: usize = 4096;

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Name of the source; only used as a probing hint and in logs
    pub source_name: String,
    /// Fixed block size of the source, 0 or 1 when unknown
    pub block_size: u32,
    /// Maximum width or height of decoded frames, 0 for no limit
    pub max_dimension: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            source_name: String::new(),
            block_size: 0,
            max_dimension: 0,
        }
    }
}

impl DecoderConfig {
    /// Build a config from host-supplied hints; negative hints count as 0
    pub fn new(source_name: impl Into<String>, block_size_hint: i32, max_dimension_hint: i32) -> Self {
        Self {
            source_name: source_name.into(),
            block_size: block_size_hint.max(0) as u32,
            max_dimension: max_dimension_hint.max(0) as u32,
        }
    }

    /// Whether the source delivers data in fixed-size blocks
    pub fn has_fixed_block_size(&self) -> bool {
        self.block_size > 1
    }

    /// Size of the buffer handed to the demuxer's I/O layer
    pub fn io_buffer_size(&self) -> usize {
        if self.has_fixed_block_size() {
            self.block_size as usize
        } else {
            DEFAULT_IO_BUFFER_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_hints_clamp_to_zero() {
        let config = DecoderConfig::new("clip.mp4", -5, -1);
        assert_eq!(config.block_size, 0);
        assert_eq!(config.max_dimension, 0);
    }

    #[test]
    fn test_io_buffer_size() {
        assert_eq!(DecoderConfig::new("a", 0, 0).io_buffer_size(), DEFAULT_IO_BUFFER_SIZE);
        assert_eq!(DecoderConfig::new("a", 1, 0).io_buffer_size(), DEFAULT_IO_BUFFER_SIZE);
        assert_eq!(DecoderConfig::new("a", 262_144, 0).io_buffer_size(), 262_144);
        assert!(!DecoderConfig::new("a", 1, 0).has_fixed_block_size());
    }
}
