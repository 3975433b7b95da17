/// CSV writers for run outputs.
pub mod export;
