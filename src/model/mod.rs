pub mod app_model;
pub mod builder;
pub mod hints;
pub mod identity;
