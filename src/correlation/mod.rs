pub mod correlation_model;
pub mod correlator;
pub mod strategy;
