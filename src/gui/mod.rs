//! Terminal front ends.

mod beam_view;
mod device_selector;
mod error;

pub use beam_view::{beam_view, heat_color, image_lines, ViewExit};
pub use device_selector::device_selector;
pub use error::GuiError;
