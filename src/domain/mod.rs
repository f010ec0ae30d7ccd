pub mod event;
pub mod ports;
pub mod task;
