use std::sync::mpsc;

use egui::{Modifiers, Pos2, pos2};
use image::Rgba;
use paintfe_core::ops::canvas_ops;
use paintfe_core::{EditorEvent, Notifier, PixelRect, Project, SelectionShape, ToolInput, ToolKind};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

fn drag(p: &mut Project, points: &[Pos2], modifiers: Modifiers) {
    p.pointer_press(&ToolInput::at(points[0]).with_modifiers(modifiers));
    for pt in &points[1..] {
        p.pointer_move(&ToolInput::at(*pt).with_modifiers(modifiers));
    }
    let last = points[points.len() - 1];
    p.pointer_release(&ToolInput::at(last).with_modifiers(modifiers));
}

fn pixel(p: &Project, x: i32, y: i32) -> Rgba<u8> {
    p.document.active_layer().and_then(|l| l.pixel(x, y)).unwrap()
}

fn paint_red_block(p: &mut Project) {
    let layer = p.document.active_layer_mut().unwrap();
    for y in 10..30 {
        for x in 10..30 {
            layer.pixels.put_pixel(x, y, RED);
        }
    }
}

#[test]
fn brush_stroke_is_one_undo_step() {
    let mut p = Project::new_untitled(1, 64, 32);
    p.select_tool(ToolKind::Brush);
    let before = p.document.active_layer().unwrap().pixels.clone();
    drag(&mut p, &[pos2(5.0, 16.0), pos2(20.0, 16.0), pos2(40.0, 16.0), pos2(58.0, 16.0)], Modifiers::NONE);

    assert_ne!(pixel(&p, 30, 16), WHITE);
    assert_eq!(p.bus.history().undo_count(), 1);
    assert_eq!(p.bus.history().undo_description().as_deref(), Some("Brush Stroke"));
    assert!(p.is_dirty);

    assert!(p.undo());
    assert_eq!(p.document.active_layer().unwrap().pixels, before);
    assert!(p.redo());
    assert_ne!(pixel(&p, 30, 16), WHITE);
}

#[test]
fn brush_respects_selection() {
    let mut p = Project::new_untitled(1, 40, 20);
    p.select_tool(ToolKind::RectangleSelect);
    drag(&mut p, &[pos2(0.0, 0.0), pos2(10.0, 20.0)], Modifiers::NONE);
    p.select_tool(ToolKind::Brush);
    drag(&mut p, &[pos2(3.0, 10.0), pos2(35.0, 10.0)], Modifiers::NONE);

    assert_ne!(pixel(&p, 5, 10), WHITE);
    assert_eq!(pixel(&p, 20, 10), WHITE);
    assert_eq!(pixel(&p, 34, 10), WHITE);
    assert_eq!(p.bus.history().undo_count(), 2);
}

#[test]
fn escape_discards_stroke() {
    let mut p = Project::new_untitled(1, 32, 32);
    p.select_tool(ToolKind::Brush);
    let before = p.document.active_layer().unwrap().pixels.clone();
    p.pointer_press(&ToolInput::at(pos2(4.0, 4.0)));
    p.pointer_move(&ToolInput::at(pos2(28.0, 28.0)));
    assert_ne!(p.document.active_layer().unwrap().pixels, before);

    p.cancel_gesture();
    assert_eq!(p.document.active_layer().unwrap().pixels, before);
    assert!(!p.can_undo());
    assert!(!p.is_dirty);
    // Release after cancel is ignored.
    assert!(!p.pointer_release(&ToolInput::at(pos2(28.0, 28.0))));
}

#[test]
fn undo_mid_gesture_cancels_it_first() {
    let mut p = Project::new_untitled(1, 32, 32);
    p.select_tool(ToolKind::Fill);
    let click = ToolInput::at(pos2(3.0, 3.0));
    p.props.primary_color = RED;
    p.pointer_press(&click);
    p.pointer_release(&click);
    assert_eq!(pixel(&p, 31, 31), RED);

    p.select_tool(ToolKind::Brush);
    p.pointer_press(&ToolInput::at(pos2(16.0, 16.0)));
    p.pointer_move(&ToolInput::at(pos2(20.0, 16.0)));
    assert!(p.undo());
    assert_eq!(pixel(&p, 16, 16), WHITE);
    assert!(!p.can_undo());
    assert!(p.can_redo());
}

#[test]
fn move_selection_round_trip() {
    let mut p = Project::new_untitled(1, 60, 40);
    paint_red_block(&mut p);
    p.select_tool(ToolKind::RectangleSelect);
    drag(&mut p, &[pos2(10.0, 10.0), pos2(30.0, 30.0)], Modifiers::NONE);

    p.select_tool(ToolKind::MovePixels);
    drag(&mut p, &[pos2(20.0, 20.0), pos2(25.0, 20.0), pos2(30.0, 25.0)], Modifiers::NONE);

    assert_eq!(pixel(&p, 39, 34), RED);
    assert_eq!(pixel(&p, 12, 12), Rgba([0, 0, 0, 0]));
    assert_eq!(p.document.selection().bounds(), Some(PixelRect::new(20, 15, 20, 20)));

    assert!(p.undo());
    assert_eq!(pixel(&p, 12, 12), RED);
    assert_eq!(pixel(&p, 39, 34), WHITE);
    assert_eq!(p.document.selection().bounds(), Some(PixelRect::new(10, 10, 20, 20)));

    assert!(p.redo());
    assert_eq!(pixel(&p, 39, 34), RED);
    assert_eq!(p.document.selection().bounds(), Some(PixelRect::new(20, 15, 20, 20)));
}

#[test]
fn subtract_then_fill_only_touches_remaining_area() {
    let mut p = Project::new_untitled(1, 30, 30);
    p.select_tool(ToolKind::RectangleSelect);
    drag(&mut p, &[pos2(0.0, 0.0), pos2(20.0, 20.0)], Modifiers::NONE);
    drag(&mut p, &[pos2(5.0, 5.0), pos2(15.0, 15.0)], Modifiers::ALT);

    p.select_tool(ToolKind::Fill);
    p.props.primary_color = RED;
    let click = ToolInput::at(pos2(2.0, 2.0));
    p.pointer_press(&click);
    p.pointer_release(&click);

    assert_eq!(pixel(&p, 2, 2), RED);
    assert_eq!(pixel(&p, 10, 10), WHITE);
    assert_eq!(pixel(&p, 25, 25), WHITE);
    assert_eq!(p.bus.history().undo_count(), 3);
}

#[test]
fn ellipse_selection_shape_and_notifications() {
    let (tx, rx) = mpsc::channel();
    let mut p = Project::new_untitled(1, 50, 50);
    p.set_notifier(Notifier::channel(tx));
    p.select_tool(ToolKind::EllipseSelect);
    drag(&mut p, &[pos2(10.0, 10.0), pos2(40.0, 30.0)], Modifiers::NONE);

    assert_eq!(p.document.selection().shape(), SelectionShape::Ellipse);
    let events: Vec<_> = rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, EditorEvent::SelectionChanged { bounds: Some(_), .. })));
    assert!(events.contains(&EditorEvent::HistoryChanged { undo_count: 1, redo_count: 0 }));
}

#[test]
fn layer_and_canvas_commands_go_through_history() {
    let mut p = Project::new_untitled(1, 40, 30);
    let cmd = canvas_ops::add_layer(&mut p.document);
    assert!(p.dispatch(cmd));
    assert_eq!(p.document.layer_count(), 2);

    let cmd = canvas_ops::crop_to_rect(&p.document, PixelRect::new(5, 5, 20, 10));
    assert!(p.dispatch(cmd));
    assert_eq!((p.document.width(), p.document.height()), (20, 10));
    assert!(p.document.layers().all(|l| l.width() == 20 && l.height() == 10));

    assert!(p.undo());
    assert_eq!((p.document.width(), p.document.height()), (40, 30));
    assert!(p.undo());
    assert_eq!(p.document.layer_count(), 1);
    assert!(!p.undo());

    let only = p.document.active_layer_id().unwrap();
    let cmd = canvas_ops::delete_layer(&p.document, only);
    assert!(cmd.is_none());
    assert!(!p.dispatch(cmd));
}

#[test]
fn picker_reads_without_history() {
    let mut p = Project::new_untitled(1, 60, 40);
    paint_red_block(&mut p);
    p.select_tool(ToolKind::ColorPicker);
    let click = ToolInput::at(pos2(15.0, 15.0));
    p.pointer_press(&click);
    p.pointer_release(&click);
    assert_eq!(p.props.primary_color, RED);
    assert!(!p.can_undo());
    assert!(!p.is_dirty);
}
