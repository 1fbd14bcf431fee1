use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::Document;
use crate::components::history::{Command, CommandBus, HistoryManager};
use crate::components::tools::{ActiveTool, ToolContext, ToolInput, ToolKind, ToolProperties};
use crate::events::Notifier;
use crate::io::{self, ProjectError};
use crate::settings::EditorSettings;

/// Single open document.
pub struct Project {
    pub id: Uuid,
    pub document: Document,
    pub bus: CommandBus,
    pub tool: ActiveTool,
    pub props: ToolProperties,
    pub settings: EditorSettings,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32) -> Self {
        Self::with_settings(untitled_counter, width, height, EditorSettings::default())
    }

    pub fn with_settings(untitled_counter: usize, width: u32, height: u32, settings: EditorSettings) -> Self {
        Self::from_document(
            Document::new(width, height),
            None,
            format!("Untitled-{}", untitled_counter),
            settings,
        )
    }

    fn from_document(document: Document, path: Option<PathBuf>, name: String, settings: EditorSettings) -> Self {
        let history = HistoryManager::new(settings.max_undo_steps)
            .with_memory_limit(settings.history_memory_bytes());
        Self {
            id: Uuid::new_v4(),
            document,
            bus: CommandBus::new(history),
            tool: ActiveTool::default(),
            props: ToolProperties::from_settings(&settings),
            settings,
            path,
            is_dirty: false,
            name,
        }
    }

    /// Open a project file written by [`Project::save_as`].
    pub fn open(path: &Path, settings: EditorSettings) -> Result<Self, ProjectError> {
        let document = io::load_project(path)?;
        let name = name_from_path(path);
        Ok(Self::from_document(document, Some(path.to_path_buf()), name, settings))
    }

    /// Route document and history notifications to `notifier`.
    pub fn set_notifier(&mut self, notifier: Notifier) {
        self.document.set_notifier(notifier.clone());
        self.bus.set_notifier(notifier);
    }

    /// Replace the settings and re-apply the history limits. Tool
    /// properties keep any values the user changed since.
    pub fn apply_settings(&mut self, settings: EditorSettings) {
        self.bus
            .history_mut()
            .set_limits(settings.max_undo_steps, settings.history_memory_bytes());
        self.props.handle_radius = settings.handle_radius;
        self.settings = settings;
    }

    // ---- tool input ----------------------------------------------------------

    pub fn select_tool(&mut self, kind: ToolKind) {
        let before = self.bus.history().revision();
        let mut ctx = ToolContext::new(&mut self.document, &mut self.bus, &mut self.props);
        self.tool.switch_to(kind, &mut ctx);
        self.track_dirty(before);
    }

    pub fn pointer_press(&mut self, input: &ToolInput) -> bool {
        let mut ctx = ToolContext::new(&mut self.document, &mut self.bus, &mut self.props);
        self.tool.on_press(&mut ctx, input)
    }

    pub fn pointer_move(&mut self, input: &ToolInput) -> bool {
        let mut ctx = ToolContext::new(&mut self.document, &mut self.bus, &mut self.props);
        self.tool.on_move(&mut ctx, input)
    }

    pub fn pointer_release(&mut self, input: &ToolInput) -> bool {
        let before = self.bus.history().revision();
        let mut ctx = ToolContext::new(&mut self.document, &mut self.bus, &mut self.props);
        let handled = self.tool.on_release(&mut ctx, input);
        self.track_dirty(before);
        handled
    }

    /// Abort the running gesture (Escape). Pixels and selection return to
    /// their pre-gesture state and nothing is recorded.
    pub fn cancel_gesture(&mut self) {
        let mut ctx = ToolContext::new(&mut self.document, &mut self.bus, &mut self.props);
        self.tool.reset(&mut ctx);
    }

    // ---- commands ------------------------------------------------------------

    /// Apply and record a command built by one of the `ops` builders.
    pub fn dispatch(&mut self, command: Option<Box<dyn Command>>) -> bool {
        self.cancel_gesture();
        let done = self.bus.dispatch(&mut self.document, command);
        if done {
            self.mark_dirty();
        }
        done
    }

    pub fn undo(&mut self) -> bool {
        self.cancel_gesture();
        let done = self.bus.undo(&mut self.document);
        if done {
            self.mark_dirty();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_gesture();
        let done = self.bus.redo(&mut self.document);
        if done {
            self.mark_dirty();
        }
        done
    }

    pub fn can_undo(&self) -> bool {
        self.bus.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.bus.history().can_redo()
    }

    // ---- files ---------------------------------------------------------------

    /// Save to the current path. Fails with `InvalidFormat` for untitled
    /// projects; use [`Project::save_as`] for those.
    pub fn save(&mut self) -> Result<(), ProjectError> {
        let Some(path) = self.path.clone() else {
            return Err(ProjectError::InvalidFormat("project has no file path".to_string()));
        };
        self.save_as(&path)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), ProjectError> {
        self.cancel_gesture();
        io::save_project(&self.document, path)?;
        self.path = Some(path.to_path_buf());
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = name_from_path(path);
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    fn track_dirty(&mut self, revision_before: u64) {
        if self.bus.history().revision() != revision_before {
            self.mark_dirty();
        }
    }
}

fn name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Pos2;

    #[test]
    fn new_project_is_clean_and_untitled() {
        let p = Project::new_untitled(3, 32, 16);
        assert_eq!(p.display_title(), "Untitled-3");
        assert_eq!(p.document.width(), 32);
        assert_eq!(p.document.layer_count(), 1);
        assert!(!p.can_undo());
    }

    #[test]
    fn settings_reach_history_and_tools() {
        let settings = EditorSettings {
            max_undo_steps: 2,
            brush_size: 4.0,
            ..EditorSettings::default()
        };
        let mut p = Project::with_settings(1, 20, 20, settings);
        assert_eq!(p.props.size, 4.0);
        p.select_tool(ToolKind::RectangleSelect);
        for i in 0..4 {
            let x = i as f32;
            p.pointer_press(&ToolInput::at(Pos2::new(x, 0.0)));
            p.pointer_move(&ToolInput::at(Pos2::new(x + 5.0, 5.0)));
            p.pointer_release(&ToolInput::at(Pos2::new(x + 5.0, 5.0)));
        }
        assert_eq!(p.bus.history().undo_count(), 2);
        assert!(p.is_dirty);
    }

    #[test]
    fn save_without_path_fails() {
        let mut p = Project::new_untitled(1, 8, 8);
        assert!(matches!(p.save(), Err(ProjectError::InvalidFormat(_))));
    }
}
