pub mod accounting;
pub mod error;
pub mod index;
pub mod model;
pub mod resolver;
pub mod validate;
