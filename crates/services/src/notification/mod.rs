//! 通知服务

pub mod telegram;

pub use telegram::TelegramNotifier;
