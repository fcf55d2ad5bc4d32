//! Channel data model: index metadata, stored chunks and the row reader.

pub mod chunk;
pub mod index;
pub mod reader;

pub use chunk::ChannelDataChunk;
pub use index::{ChannelIndexInfo, IndexValue};
pub use reader::{ChannelDataReader, ChannelLayout, ChannelRecord};
