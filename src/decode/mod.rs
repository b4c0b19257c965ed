pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod resources;
pub mod state;

pub use config::{DecoderConfig, DEFAULT_IO_BUFFER_SIZE};
pub use decoder::StreamDecoder;
pub use error::DecodeError;
pub use frame::FrameView;
pub use state::DecoderState;
