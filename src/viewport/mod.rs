//! Viewport projection: maps the selected session set onto a bounded grid
//! of display slots. Purely presentational; never issues control calls.

use std::fmt;
use std::str::FromStr;

use crate::session::Session;

/// Grid layout of the live view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Single,
    TwoByTwo,
    ThreeByThree,
    FourByFour,
}

impl ViewMode {
    /// Number of display slots in this layout
    pub fn capacity(&self) -> usize {
        match self {
            ViewMode::Single => 1,
            ViewMode::TwoByTwo => 4,
            ViewMode::ThreeByThree => 9,
            ViewMode::FourByFour => 16,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViewMode::Single => "1x1",
            ViewMode::TwoByTwo => "2x2",
            ViewMode::ThreeByThree => "3x3",
            ViewMode::FourByFour => "4x4",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1x1" => Ok(ViewMode::Single),
            "2x2" => Ok(ViewMode::TwoByTwo),
            "3x3" => Ok(ViewMode::ThreeByThree),
            "4x4" => Ok(ViewMode::FourByFour),
            other => Err(anyhow::anyhow!(
                "unknown view mode '{}' (expected 1x1, 2x2, 3x3 or 4x4)",
                other
            )),
        }
    }
}

/// One display slot of the grid
#[derive(Debug, Clone)]
pub enum Slot {
    /// Occupied by a session (may still be `Starting`; it keeps its slot)
    Stream(Session),
    /// Placeholder; the multiplexer never requests sessions to fill it
    Empty,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// The rendered grid: exactly `mode.capacity()` slots
#[derive(Debug, Clone)]
pub struct ViewportGrid {
    pub mode: ViewMode,
    pub slots: Vec<Slot>,
}

impl ViewportGrid {
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }
}

/// Project the displayable sessions onto the bounded slot set.
///
/// The first `capacity` sessions in selection order are shown; a session's
/// position never changes when its backend state changes. Overflow sessions
/// stay selected but undisplayed until the mode grows or earlier selections
/// are removed.
pub fn project(active: &[Session], mode: ViewMode) -> ViewportGrid {
    let capacity = mode.capacity();
    let mut slots: Vec<Slot> = active
        .iter()
        .take(capacity)
        .cloned()
        .map(Slot::Stream)
        .collect();
    slots.resize_with(capacity, || Slot::Empty);

    ViewportGrid { mode, slots }
}
