pub mod locator_model;
pub mod normalize;
pub mod scorer;
