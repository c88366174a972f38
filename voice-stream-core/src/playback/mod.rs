pub mod scheduler;
pub mod timeline;
