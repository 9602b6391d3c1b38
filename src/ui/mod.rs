//! Art preparation and rendering.
//!
//! - **art**: SAUCE stripping, line splitting, CP437 decoding
//! - **wrap**: visible width counting and auto-wrap avoidance
//! - **viewport**: clamped scroll window
//! - **render**: full and incremental redraw with a static footer

pub mod art;
pub mod render;
pub mod viewport;
pub mod wrap;

pub use art::{Art, TextMode};
pub use render::{RenderOptions, RenderPipeline};
