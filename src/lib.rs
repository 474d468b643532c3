pub mod cli;
pub mod correlation;
pub mod error;
pub mod event;
pub mod healing;
pub mod locator;
pub mod logging;
pub mod model;
