//! Reversible raster-editing core: undo/redo command engine, tool state
//! machine, region snapshots, selection masks and floating buffers.
//!
//! Everything here runs synchronously on the thread that receives input.
//! A host owns one [`project::Project`] per open document and feeds it
//! pointer events; rendering reads layer buffers through [`canvas::Document`].

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod events;
pub mod io;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;

pub use canvas::{BlendMode, Document, Layer, LayerId, PixelRect};
pub use components::history::{Command, CommandBus, HistoryManager};
pub use components::tools::{ActiveTool, ToolInput, ToolKind, ToolProperties, ToolState};
pub use events::{EditorEvent, EventSink, Notifier};
pub use project::Project;
pub use selection::{SelectionManager, SelectionMask, SelectionMode, SelectionPath, SelectionShape};
