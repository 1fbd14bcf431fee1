pub mod history;
pub mod paint_tools;
pub mod select_tools;
pub mod tools;
