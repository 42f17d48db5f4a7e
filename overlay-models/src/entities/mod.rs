pub mod prelude;

pub mod overlay;
