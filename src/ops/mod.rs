pub mod brushes;
pub mod canvas_ops;
pub mod fill;
pub mod floating;
pub mod transform;
