pub mod adc;
pub mod bargraph;
pub mod lamps;
pub mod outputs;
