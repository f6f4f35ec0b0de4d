//! Row layout: padding cells between fields whose offsets leave a gap.

use crate::field::placement::{LayoutOptions, Placement, GRID_COLUMNS};

/// A layout-only cell inserted before a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Padding {
    /// Placement of the padding cell.
    pub placement: Placement,
}

impl Padding {
    /// Builds the padding cell for per-breakpoint widths, or `None` when no padding is needed.
    #[must_use]
    pub fn new(width: LayoutOptions<u32>) -> Option<Self> {
        let LayoutOptions { s, m, l } = width;
        let field = match (s, m, l) {
            (0, 0, 0) => return None,
            (0, 0, l) => format!("show-for-large-up large-{l} columns"),
            (0, m, 0) => format!("show-for-medium-only medium-{m} columns"),
            (0, m, l) => format!("hide-for-small-only medium-{m} large-{l} columns"),
            (s, 0, 0) => format!("show-for-small-only small-{s}"),
            (s, 0, l) => format!("hide-for-medium-only small-{s} large-{l}"),
            (s, m, 0) => format!("hide-for-large-up small-{s} medium-{m}"),
            (s, m, l) => format!("small-{s} medium-{m} large-{l}"),
        };
        Some(Self {
            placement: Placement {
                width,
                offset: LayoutOptions::uniform(0),
                display: LayoutOptions {
                    s: s > 0,
                    m: m > 0,
                    l: l > 0,
                },
                field,
                label: "small-4 columns".to_string(),
                value: "small-8 columns".to_string(),
            },
        })
    }
}

/// Outcome of placing one field in one breakpoint channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    next_row: bool,
    padding: u32,
    position: u32,
}

fn step(position: u32, offset: u32, width: u32, display: bool) -> Step {
    if !display {
        return Step {
            next_row: false,
            padding: 0,
            position,
        };
    }
    let end = offset.saturating_add(width);
    let next_row = offset < position || end > GRID_COLUMNS;
    Step {
        next_row,
        padding: if next_row { offset } else { offset - position },
        position: end,
    }
}

/// Tracks the column position after the last placed field at each breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPosition {
    pos: LayoutOptions<u32>,
}

impl Default for RowPosition {
    fn default() -> Self {
        Self {
            pos: LayoutOptions::uniform(0),
        }
    }
}

/// Result of placing a field: whether it starts a new row, and any padding before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placed {
    /// The field (and its padding) start a new row at the large breakpoint.
    pub next_row: bool,
    /// Padding cell preceding the field.
    pub padding: Option<Padding>,
}

impl RowPosition {
    /// Returns the current position.
    #[must_use]
    pub fn position(&self) -> LayoutOptions<u32> {
        self.pos
    }

    /// Places a field and advances the position.
    ///
    /// Only the large breakpoint forces a new row; smaller layouts wrap in
    /// the browser but keep their own positions for padding.
    pub fn place(&mut self, placement: &Placement) -> Placed {
        let s = step(self.pos.s, placement.offset.s, placement.width.s, placement.display.s);
        let m = step(self.pos.m, placement.offset.m, placement.width.m, placement.display.m);
        let l = step(self.pos.l, placement.offset.l, placement.width.l, placement.display.l);
        self.pos = LayoutOptions {
            s: s.position,
            m: m.position,
            l: l.position,
        };
        Placed {
            next_row: l.next_row,
            padding: Padding::new(LayoutOptions {
                s: s.padding,
                m: m.padding,
                l: l.padding,
            }),
        }
    }

    /// Moves to the start of a new row.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_by_side_fields_need_no_padding() {
        let mut pos = RowPosition::default();
        let half = Placement::parse("small:0,12;medium:0,6");
        let right = Placement::parse("small:0,12;medium:6,6");
        assert_eq!(pos.place(&half), Placed { next_row: false, padding: None });
        let placed = pos.place(&right);
        assert!(!placed.next_row);
        assert!(placed.padding.is_none());
        assert_eq!(pos.position(), LayoutOptions { s: 12, m: 12, l: 12 });
    }

    #[test]
    fn test_offset_inserts_padding() {
        let mut pos = RowPosition::default();
        pos.place(&Placement::parse("small:0,12;medium:0,4"));
        let placed = pos.place(&Placement::parse("small:0,12;medium:8,4"));
        assert!(!placed.next_row);
        let pad = placed.padding.unwrap();
        assert_eq!(pad.placement.width, LayoutOptions { s: 0, m: 4, l: 4 });
        assert_eq!(pad.placement.field, "hide-for-small-only medium-4 large-4 columns");
        assert_eq!(pad.placement.display, LayoutOptions { s: false, m: true, l: true });
    }

    #[test]
    fn test_overflow_starts_new_row() {
        let mut pos = RowPosition::default();
        pos.place(&Placement::parse("small:0,12;medium:0,8"));
        let placed = pos.place(&Placement::parse("small:0,12;medium:2,6"));
        assert!(placed.next_row);
        let pad = placed.padding.unwrap();
        assert_eq!(pad.placement.width, LayoutOptions { s: 0, m: 2, l: 2 });
        assert_eq!(pos.position().l, 8);
    }

    #[test]
    fn test_huge_placement_does_not_overflow() {
        let mut pos = RowPosition::default();
        pos.place(&Placement::parse("small:0,6"));
        let placed = pos.place(&Placement::parse("small:4000000000,4000000000"));
        assert!(placed.next_row);
        assert_eq!(pos.position(), LayoutOptions::uniform(24));

        let mut raw = Placement::parse("small:0,12");
        raw.offset = LayoutOptions::uniform(u32::MAX);
        raw.width = LayoutOptions::uniform(u32::MAX);
        let placed = pos.place(&raw);
        assert!(placed.next_row);
        assert_eq!(pos.position(), LayoutOptions::uniform(u32::MAX));
    }

    #[test]
    fn test_hidden_field_keeps_position() {
        let mut pos = RowPosition::default();
        pos.place(&Placement::parse("small:0,6"));
        let placed = pos.place(&Placement::parse("small:0,12,hide;medium:6,6"));
        assert!(!placed.next_row);
        assert!(placed.padding.is_none());
        assert_eq!(pos.position(), LayoutOptions { s: 6, m: 12, l: 12 });
    }

    #[test]
    fn test_padding_class_strings() {
        let p = Padding::new(LayoutOptions { s: 3, m: 0, l: 0 }).unwrap();
        assert_eq!(p.placement.field, "show-for-small-only small-3");
        let p = Padding::new(LayoutOptions { s: 2, m: 4, l: 6 }).unwrap();
        assert_eq!(p.placement.field, "small-2 medium-4 large-6");
        assert!(Padding::new(LayoutOptions::uniform(0)).is_none());
    }
}
