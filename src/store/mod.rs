pub mod candles;
pub mod hours;
