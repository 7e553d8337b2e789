//! Virtual screen, dirty tracking and the host frame interface.

use std::{cell::RefCell, rc::Rc};

use scumm_formats::{Canvas, Rect};
use serde::Serialize;

/// Host display. Receives only what changed during a tick.
pub trait FrameSink {
    /// `pixels` is `rect` row by row.
    fn blit(&mut self, rect: Rect, pixels: &[u8]);
    /// `rgb` holds three bytes per entry starting at `first`.
    fn palette(&mut self, first: usize, rgb: &[u8]);
    fn text(&mut self, x: i32, y: i32, color: i32, text: &str);
}

#[derive(Debug, Clone, Default)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn blit(&mut self, _rect: Rect, _pixels: &[u8]) {}
    fn palette(&mut self, _first: usize, _rgb: &[u8]) {}
    fn text(&mut self, _x: i32, _y: i32, _color: i32, _text: &str) {}
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameEvent {
    Blit { rect: Rect, checksum: u32 },
    Palette { first: usize, count: usize },
    Text {
        x: i32,
        y: i32,
        color: i32,
        text: String,
    },
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811C_9DC5u32, |hash, &b| {
        (hash ^ b as u32).wrapping_mul(0x0100_0193)
    })
}

#[derive(Clone, Default)]
pub struct RecordingFrameSink {
    events: Rc<RefCell<Vec<FrameEvent>>>,
}

impl RecordingFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FrameEvent> {
        self.events.borrow().clone()
    }
}

impl FrameSink for RecordingFrameSink {
    fn blit(&mut self, rect: Rect, pixels: &[u8]) {
        self.events.borrow_mut().push(FrameEvent::Blit {
            rect,
            checksum: fnv1a(pixels),
        });
    }

    fn palette(&mut self, first: usize, rgb: &[u8]) {
        self.events.borrow_mut().push(FrameEvent::Palette {
            first,
            count: rgb.len() / 3,
        });
    }

    fn text(&mut self, x: i32, y: i32, color: i32, text: &str) {
        self.events.borrow_mut().push(FrameEvent::Text {
            x,
            y,
            color,
            text: text.to_string(),
        });
    }
}

/// The composited main screen plus the list of rectangles that changed
/// since the last flush.
#[derive(Debug, Clone)]
pub struct VirtualScreen {
    main: Canvas,
    dirty: Vec<Rect>,
    /// Screen area covered by printed or spoken text.
    text_mask: Option<Rect>,
    /// First visible row of the room view.
    pub top: i32,
    pub height: i32,
    pub shake: bool,
}

impl VirtualScreen {
    pub fn new(width: i32, height: i32) -> Self {
        VirtualScreen {
            main: Canvas::new(width.max(1) as usize, height.max(1) as usize, 0),
            dirty: Vec::new(),
            text_mask: None,
            top: 0,
            height,
            shake: false,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.main
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.main
    }

    pub fn bounds(&self) -> Rect {
        self.main.bounds()
    }

    /// Adds a rectangle, merging it with any dirty rectangle it overlaps.
    pub fn mark_dirty(&mut self, rect: Rect) {
        let Some(mut rect) = rect.intersect(&self.main.bounds()) else {
            return;
        };
        let mut i = 0;
        while i < self.dirty.len() {
            if self.dirty[i].intersect(&rect).is_some() {
                rect = rect.union(&self.dirty.swap_remove(i));
                i = 0;
            } else {
                i += 1;
            }
        }
        self.dirty.push(rect);
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.clear();
        self.dirty.push(self.main.bounds());
    }

    pub fn dirty(&self) -> &[Rect] {
        &self.dirty
    }

    pub fn text_mask(&self) -> Option<Rect> {
        self.text_mask
    }

    /// Grows the text mask to cover `rect`.
    pub fn add_text_mask(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.text_mask = Some(match self.text_mask {
            Some(mask) => mask.union(&rect),
            None => rect,
        });
        self.mark_dirty(rect);
    }

    /// Drops the text mask, leaving the area it covered dirty.
    pub fn clear_text_mask(&mut self) {
        if let Some(mask) = self.text_mask.take() {
            self.mark_dirty(mask);
        }
    }

    /// Moves the text mask with the view so it keeps covering the same
    /// room pixels.
    pub fn scroll_text_mask(&mut self, dx: i32, dy: i32) {
        if let Some(mask) = self.text_mask.as_mut() {
            *mask = mask.translate(dx, dy);
        }
    }

    pub(crate) fn restore_text_mask(&mut self, mask: Option<Rect>) {
        self.text_mask = mask;
    }

    /// Sets the room view band (`roomOps` screen).
    pub fn init_screens(&mut self, top: i32, height: i32) {
        self.top = top;
        self.height = height;
        self.mark_all_dirty();
    }

    pub fn fill_rect(&mut self, rect: Rect, color: u8) {
        if let Some(touched) = self.main.fill_rect(rect, color) {
            self.mark_dirty(touched);
        }
    }

    pub fn clear(&mut self) {
        self.main.pixels.fill(0);
        self.text_mask = None;
        self.mark_all_dirty();
    }

    /// Sends every dirty rectangle to the sink. Returns how many were sent.
    pub fn flush(&mut self, sink: &mut dyn FrameSink) -> usize {
        let rects = std::mem::take(&mut self.dirty);
        let mut buffer = Vec::new();
        for rect in &rects {
            buffer.clear();
            for y in rect.top..rect.bottom {
                let row = self.main.row(y as usize);
                buffer.extend_from_slice(&row[rect.left as usize..rect.right as usize]);
            }
            sink.blit(*rect, &buffer);
        }
        rects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_dirty_rects_merge() {
        let mut screen = VirtualScreen::new(320, 200);
        screen.mark_dirty(Rect::new(0, 0, 10, 10));
        screen.mark_dirty(Rect::new(50, 50, 60, 60));
        screen.mark_dirty(Rect::new(5, 5, 55, 55));
        assert_eq!(screen.dirty(), &[Rect::new(0, 0, 60, 60)]);
        screen.mark_dirty(Rect::new(400, 0, 410, 10));
        assert_eq!(screen.dirty().len(), 1);
    }

    #[test]
    fn flush_sends_clipped_pixels() {
        let mut screen = VirtualScreen::new(16, 8);
        let sink = RecordingFrameSink::new();
        screen.fill_rect(Rect::new(-4, 2, 4, 4), 7);
        let mut out = sink.clone();
        assert_eq!(screen.flush(&mut out), 1);
        assert_eq!(
            sink.events(),
            vec![FrameEvent::Blit {
                rect: Rect::new(0, 2, 4, 4),
                checksum: fnv1a(&[7; 8]),
            }]
        );
        assert!(screen.dirty().is_empty());
    }

    #[test]
    fn text_mask_grows_scrolls_and_clears() {
        let mut screen = VirtualScreen::new(320, 200);
        screen.add_text_mask(Rect::new(10, 10, 26, 18));
        screen.add_text_mask(Rect::new(20, 30, 28, 38));
        assert_eq!(screen.text_mask(), Some(Rect::new(10, 10, 28, 38)));
        screen.scroll_text_mask(-8, 0);
        assert_eq!(screen.text_mask(), Some(Rect::new(2, 10, 20, 38)));
        screen.flush(&mut NullFrameSink);
        screen.clear_text_mask();
        assert_eq!(screen.text_mask(), None);
        assert_eq!(screen.dirty(), &[Rect::new(2, 10, 20, 38)]);
    }
}
