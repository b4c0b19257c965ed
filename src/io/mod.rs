pub mod avio;
pub mod virtual_io;

pub use avio::{AvioContext, SourceCell};
pub use virtual_io::{IoError, VirtualIo, Whence};
