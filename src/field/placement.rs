//! Field placement: responsive grid width and offset per breakpoint.
//!
//! A placement string is a `;`-separated list of `<breakpoint>:<offset>,<width>`
//! items, each optionally followed by `,right` and/or `,hide`. Later
//! breakpoints inherit from earlier ones: `small:0,6` alone applies a width
//! of 6 at every size.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of grid columns in a row.
pub const GRID_COLUMNS: u32 = 12;

/// One value per breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOptions<T> {
    /// Small screens.
    pub s: T,
    /// Medium screens.
    pub m: T,
    /// Large screens.
    pub l: T,
}

impl<T: Copy> LayoutOptions<T> {
    /// Uses the same value at every breakpoint.
    pub const fn uniform(v: T) -> Self {
        Self { s: v, m: v, l: v }
    }

    fn get(&self, bp: Breakpoint) -> T {
        match bp {
            Breakpoint::Small => self.s,
            Breakpoint::Medium => self.m,
            Breakpoint::Large => self.l,
        }
    }

    fn set(&mut self, bp: Breakpoint, v: T) {
        match bp {
            Breakpoint::Small => self.s = v,
            Breakpoint::Medium => self.m = v,
            Breakpoint::Large => self.l = v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breakpoint {
    Small,
    Medium,
    Large,
}

impl Breakpoint {
    const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    fn name(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    /// Width of the label cell, in columns, when the field spans the whole row.
    fn label_columns(self) -> u32 {
        match self {
            Self::Small => 12,
            Self::Medium | Self::Large => 2,
        }
    }
}

/// A parsed placement with derived CSS class strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Field width per breakpoint.
    pub width: LayoutOptions<u32>,
    /// Field offset per breakpoint.
    pub offset: LayoutOptions<u32>,
    /// Whether the field is shown at each breakpoint.
    pub display: LayoutOptions<bool>,
    /// Classes for the field cell.
    pub field: String,
    /// Classes for the label within the field.
    pub label: String,
    /// Classes for the value within the field.
    pub value: String,
}

static PLACEMENT_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn placement_regex() -> Option<&'static Regex> {
    PLACEMENT_RE
        .get_or_init(|| Regex::new(r"^(small|medium|large):(\d+),(\d+),?(right)?,?(hide)?$").ok())
        .as_ref()
}

struct Widths {
    field: LayoutOptions<u32>,
    label: LayoutOptions<u32>,
    value: LayoutOptions<u32>,
}

impl Widths {
    fn new() -> Self {
        let mut w = Self {
            field: LayoutOptions::uniform(0),
            label: LayoutOptions::uniform(0),
            value: LayoutOptions::uniform(0),
        };
        for bp in Breakpoint::ALL {
            w.set(bp, GRID_COLUMNS);
        }
        w
    }

    fn set(&mut self, bp: Breakpoint, width: u32) {
        if width == 0 {
            self.field.set(bp, 0);
            self.label.set(bp, 0);
            self.value.set(bp, 0);
            return;
        }
        let label = bp.label_columns() * (GRID_COLUMNS / width);
        self.field.set(bp, width);
        if label >= GRID_COLUMNS {
            self.label.set(bp, GRID_COLUMNS);
            self.value.set(bp, GRID_COLUMNS);
        } else {
            self.label.set(bp, label);
            self.value.set(bp, GRID_COLUMNS - label);
        }
    }
}

fn format_classes(widths: &LayoutOptions<u32>, extra: &[&str]) -> String {
    let mut parts = Vec::new();
    let mut prev = None;
    for bp in Breakpoint::ALL {
        let w = widths.get(bp);
        if prev != Some(w) {
            parts.push(format!("{}-{w}", bp.name()));
            prev = Some(w);
        }
    }
    parts.push("columns".to_string());
    parts.extend(extra.iter().filter(|s| !s.is_empty()).map(|s| (*s).to_string()));
    parts.join(" ")
}

impl Placement {
    /// Parses a placement string. Parsing stops at the first item that does
    /// not match; an empty string gives a full-width placement.
    #[must_use]
    pub fn parse(placement: &str) -> Self {
        let mut widths = Widths::new();
        let mut offset = LayoutOptions::uniform(0);
        let mut display = LayoutOptions::uniform(true);
        let mut right = "";
        let mut show = "";

        for item in placement.split(';').map(str::trim) {
            let Some(caps) = placement_regex().and_then(|re| re.captures(item)) else {
                break;
            };
            let Some(bp) = Breakpoint::from_name(&caps[1]) else {
                break;
            };
            let (Ok(off), Ok(width)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
                break;
            };
            let (off, width) = (off.min(GRID_COLUMNS), width.min(GRID_COLUMNS));
            right = if caps.get(4).is_some() { "right" } else { "" };
            let hide = caps.get(5).is_some();
            if hide {
                show = match bp {
                    Breakpoint::Small => "show-for-medium-up",
                    Breakpoint::Medium => "show-for-large-up",
                    Breakpoint::Large => "",
                };
                display.set(bp, false);
            }
            widths.set(bp, width);
            offset.set(bp, off);
            if bp == Breakpoint::Small {
                widths.set(Breakpoint::Medium, width);
                offset.set(Breakpoint::Medium, off);
            }
            if bp != Breakpoint::Large {
                widths.set(Breakpoint::Large, width);
                offset.set(Breakpoint::Large, off);
            }
        }

        Self {
            field: format_classes(&widths.field, &[right, show]),
            label: format_classes(&widths.label, &[]),
            value: format_classes(&widths.value, &[]),
            width: widths.field,
            offset,
            display,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::parse("")
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_medium() {
        let p = Placement::parse("small:0,12;medium:0,6");
        assert_eq!(p.width, LayoutOptions { s: 12, m: 6, l: 6 });
        assert_eq!(p.offset, LayoutOptions::uniform(0));
        assert_eq!(p.display, LayoutOptions::uniform(true));
        assert_eq!(p.field, "small-12 medium-6 columns");
    }

    #[test]
    fn test_full_width_classes() {
        let p = Placement::parse("small:0,12");
        assert_eq!(p.field, "small-12 columns");
        assert_eq!(p.label, "small-12 medium-2 columns");
        assert_eq!(p.value, "small-12 medium-10 columns");
        assert_eq!(Placement::parse("medium:0,12"), p);
        assert_eq!(Placement::default(), p);
    }

    #[test]
    fn test_three_breakpoints() {
        let p = Placement::parse("small:0,12;medium:0,6;large:0,4");
        assert_eq!(p.width, LayoutOptions { s: 12, m: 6, l: 4 });
        assert_eq!(p.field, "small-12 medium-6 large-4 columns");
        assert_eq!(p.label, "small-12 medium-4 large-6 columns");
        assert_eq!(p.value, "small-12 medium-8 large-6 columns");
    }

    #[test]
    fn test_small_applies_everywhere() {
        let p = Placement::parse("small:0,6");
        assert_eq!(p.width, LayoutOptions::uniform(6));
        assert_eq!(p.field, "small-6 columns");
        assert_eq!(p.label, "small-12 medium-4 columns");
        assert_eq!(p.value, "small-12 medium-8 columns");
    }

    #[test]
    fn test_whitespace_and_offsets() {
        let p = Placement::parse("small:0,12; medium:6,6");
        assert_eq!(p.width, LayoutOptions { s: 12, m: 6, l: 6 });
        assert_eq!(p.offset, LayoutOptions { s: 0, m: 6, l: 6 });
    }

    #[test]
    fn test_right_and_hide() {
        let p = Placement::parse("small:0,6;medium:0,4,right");
        assert_eq!(p.field, "small-6 medium-4 columns right");
        let p = Placement::parse("small:0,12,hide;medium:0,4");
        assert_eq!(p.display, LayoutOptions { s: false, m: true, l: true });
        assert_eq!(p.field, "small-12 medium-4 columns show-for-medium-up");
    }

    #[test]
    fn test_out_of_range_columns_are_clamped() {
        let p = Placement::parse("small:4000000000,4000000000");
        assert_eq!(p.width, LayoutOptions::uniform(GRID_COLUMNS));
        assert_eq!(p.offset, LayoutOptions::uniform(GRID_COLUMNS));
        assert_eq!(p.field, "small-12 columns");
    }

    #[test]
    fn test_malformed_item_stops_parsing() {
        let p = Placement::parse("small:0,6;bogus;medium:0,4");
        assert_eq!(p.width, LayoutOptions::uniform(6));
    }
}
