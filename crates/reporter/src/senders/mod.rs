pub mod json_lines;
pub mod memory;

pub use json_lines::JsonLinesSender;
pub use memory::MemorySender;
