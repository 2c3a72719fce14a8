// mesh/mod.rs
// Block-structured mesh: index boxes, level layouts and ghosted fields

mod field;
mod index_box;
mod layout;

pub use field::*;
pub use index_box::*;
pub use layout::*;
