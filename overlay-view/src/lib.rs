//! Admin and viewer projections over an [`overlay_models::OverlayStore`].

pub mod admin;
pub mod params;
pub mod sync;
pub mod templates;
pub mod viewer;
pub mod widgets;

#[cfg(test)]
mod testing;
