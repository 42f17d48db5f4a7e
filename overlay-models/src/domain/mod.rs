pub mod overlay;
pub mod prelude;
