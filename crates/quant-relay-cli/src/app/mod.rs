pub mod bootstrap;

pub use bootstrap::{build_context, parse_timeframes, scheduler_config, Bootstrapped};
