pub mod builder;
pub mod collector;
pub mod renderer;
pub mod validate;
