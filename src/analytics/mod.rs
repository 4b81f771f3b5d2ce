pub mod breakout;
pub mod hour;
pub mod volume;
