pub mod color;
pub mod names;
pub mod time;
