pub mod probability;
pub mod rules;
pub mod sizing;
pub mod types;
pub mod weather_edge;
