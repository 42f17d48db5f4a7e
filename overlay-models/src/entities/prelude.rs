pub use super::overlay::{
    ActiveModel as OverlayActiveModel, Column as OverlayColumn, Entity as Overlay,
    Model as OverlayModel,
};
