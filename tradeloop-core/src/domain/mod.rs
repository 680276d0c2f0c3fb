//! Domain types for tradeloop

pub mod bar;
pub mod rows;
pub mod signal;

pub use bar::{is_usable_price, PriceBar};
pub use rows::{
    BreadthRow, ChipRow, DailyRecord, IndicatorRow, MarginRow, StaticFundamental,
};
pub use signal::{Label, ParseSignalError, Signal};
