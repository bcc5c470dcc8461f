//! 外部信号源

pub mod process_signal_source;

pub use process_signal_source::ProcessSignalSource;
