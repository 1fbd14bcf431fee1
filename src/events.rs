// ============================================================================
// NOTIFICATIONS - fire-and-forget events for the host UI
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::canvas::{LayerId, PixelRect};
use crate::selection::SelectionShape;

/// Something the UI may want to refresh after an edit.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    /// The committed selection changed. `bounds` is `None` when nothing is selected.
    SelectionChanged {
        bounds: Option<PixelRect>,
        shape: SelectionShape,
    },
    /// Layers were added, removed, reordered, or had their metadata changed.
    LayerStackChanged {
        layer_count: usize,
        active: Option<LayerId>,
        affected: Option<LayerId>,
    },
    /// Pixels inside `rect` of `layer` were replaced by a command.
    LayerPixelsChanged { layer: LayerId, rect: PixelRect },
    /// The undo/redo stacks changed.
    HistoryChanged { undo_count: usize, redo_count: usize },
}

/// Receiver of editor events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EditorEvent);
}

impl EventSink for Sender<EditorEvent> {
    fn publish(&self, event: EditorEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Cheap, cloneable handle to an optional sink.
#[derive(Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<dyn EventSink>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Convenience: notifier feeding an mpsc channel.
    pub fn channel(sender: Sender<EditorEvent>) -> Self {
        Self::new(Arc::new(sender))
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn publish(&self, event: EditorEvent) {
        if let Some(sink) = &self.sink {
            sink.publish(event);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("connected", &self.is_connected())
            .finish()
    }
}
