pub mod candle_close_dispatcher;

pub use candle_close_dispatcher::CandleCloseDispatcher;
