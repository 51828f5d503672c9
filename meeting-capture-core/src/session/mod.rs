pub mod capture_thread;
pub mod recorder;
pub mod writer_thread;
