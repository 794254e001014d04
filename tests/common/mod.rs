pub mod fixtures;
pub mod logs;
