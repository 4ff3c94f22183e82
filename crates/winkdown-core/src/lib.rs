mod autoformat;
mod core;
pub mod list;
mod marks;
mod ops;
mod plugin;
mod serde_value;
pub mod table;
mod text;

pub use crate::autoformat::*;
pub use crate::core::*;
pub use crate::marks::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::serde_value::*;
