//! Two-cursor hit testing and drag state machine.
//!
//! # State Machine
//!
//! ```text
//!          press near cursor 1 or 2
//!   Idle ─────────────────────────────> Dragging { cursor, axis }
//!    ▲                                      │  ▲
//!    │              release                 │  │ move: update x, y or both
//!    └──────────────────────────────────────┘  └──┘
//! ```
//!
//! A press tests cursor 1 before cursor 2, and for each cursor tries both axes, then
//! x only, then y only. The hit threshold is 1% of the larger visible extent and is
//! recomputed from the range carried by each event, since the caller may zoom between
//! events. Cursors are hit-tested whether or not they are visible.

/// Which of the two cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorId {
    /// Cursor 1, checked first
    One,
    /// Cursor 2
    Two,
}

impl CursorId {
    fn index(self) -> usize {
        match self {
            CursorId::One => 0,
            CursorId::Two => 1,
        }
    }
}

/// A marker in value space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cursor {
    /// Time coordinate
    pub x: f64,
    /// Voltage coordinate
    pub y: f64,
    /// Whether the renderer should draw it
    pub visible: bool,
}

/// Coordinates a drag moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAxis {
    /// Only x
    X,
    /// Only y
    Y,
    /// x and y
    Both,
}

/// Current drag, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    /// No drag in progress
    #[default]
    Idle,
    /// A cursor is being dragged
    Dragging {
        /// The cursor under the pointer
        cursor: CursorId,
        /// Which coordinates follow the pointer
        axis: DragAxis,
    },
}

/// The value-space rectangle currently on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRange {
    /// Left edge
    pub x_min: f64,
    /// Right edge
    pub x_max: f64,
    /// Bottom edge
    pub y_min: f64,
    /// Top edge
    pub y_max: f64,
}

impl VisibleRange {
    /// Range from `(min, max)` pairs per axis.
    #[must_use]
    pub fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self {
            x_min: x.0,
            x_max: x.1,
            y_min: y.0,
            y_max: y.1,
        }
    }

    /// Midpoint of the rectangle.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Hit-test tolerance: 1% of the larger extent.
    #[must_use]
    pub fn hit_threshold(&self) -> f64 {
        let x_extent = (self.x_max - self.x_min).abs();
        let y_extent = (self.y_max - self.y_min).abs();
        0.01 * x_extent.max(y_extent)
    }
}

/// Pointer event phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// Button pressed
    Press,
    /// Pointer moved
    Move,
    /// Button released
    Release,
}

/// A pointer event already mapped into value space by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Phase
    pub kind: PointerKind,
    /// Pointer x in value space
    pub x: f64,
    /// Pointer y in value space
    pub y: f64,
    /// Visible range at the time of the event
    pub view: VisibleRange,
}

/// Cursor readout for display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CursorValues {
    /// Cursor 1 x
    pub x1: f64,
    /// Cursor 1 y
    pub y1: f64,
    /// Cursor 2 x
    pub x2: f64,
    /// Cursor 2 y
    pub y2: f64,
    /// `|x2 - x1|`
    pub dx: f64,
    /// `|y2 - y1|`
    pub dy: f64,
}

/// Owns both cursors and the drag state.
#[derive(Debug, Clone, Default)]
pub struct CursorModel {
    cursors: [Cursor; 2],
    drag: DragState,
}

impl CursorModel {
    /// Both cursors hidden at the origin, no drag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one cursor.
    #[must_use]
    pub fn cursor(&self, id: CursorId) -> Cursor {
        self.cursors[id.index()]
    }

    /// Current drag state.
    #[must_use]
    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Show or hide a cursor.
    pub fn set_visible(&mut self, id: CursorId, visible: bool) {
        self.cursors[id.index()].visible = visible;
    }

    /// Move a cursor to the middle of `view`. Leaves the drag state alone.
    pub fn center(&mut self, id: CursorId, view: &VisibleRange) {
        let (x, y) = view.center();
        let cursor = &mut self.cursors[id.index()];
        cursor.x = x;
        cursor.y = y;
    }

    /// Feed one pointer event. Returns true when the event was consumed.
    pub fn handle(&mut self, event: &PointerEvent) -> bool {
        match event.kind {
            PointerKind::Press => {
                self.drag = self.hit_test(event);
                self.drag != DragState::Idle
            }
            PointerKind::Move => match self.drag {
                DragState::Idle => false,
                DragState::Dragging { cursor, axis } => {
                    let c = &mut self.cursors[cursor.index()];
                    match axis {
                        DragAxis::X => c.x = event.x,
                        DragAxis::Y => c.y = event.y,
                        DragAxis::Both => {
                            c.x = event.x;
                            c.y = event.y;
                        }
                    }
                    true
                }
            },
            PointerKind::Release => {
                let was_dragging = self.drag != DragState::Idle;
                self.drag = DragState::Idle;
                was_dragging
            }
        }
    }

    fn hit_test(&self, event: &PointerEvent) -> DragState {
        let threshold = event.view.hit_threshold();
        for id in [CursorId::One, CursorId::Two] {
            let c = self.cursors[id.index()];
            let near_x = (c.x - event.x).abs() < threshold;
            let near_y = (c.y - event.y).abs() < threshold;
            let axis = match (near_x, near_y) {
                (true, true) => DragAxis::Both,
                (true, false) => DragAxis::X,
                (false, true) => DragAxis::Y,
                (false, false) => continue,
            };
            return DragState::Dragging { cursor: id, axis };
        }
        DragState::Idle
    }

    /// Both cursor positions and their separations.
    #[must_use]
    pub fn values(&self) -> CursorValues {
        let [c1, c2] = self.cursors;
        CursorValues {
            x1: c1.x,
            y1: c1.y,
            x2: c2.x,
            y2: c2.y,
            dx: (c2.x - c1.x).abs(),
            dy: (c2.y - c1.y).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> VisibleRange {
        // y extent 8 dominates, threshold 0.08
        VisibleRange::new((0.0, 5e-5), (-4.0, 4.0))
    }

    fn event(kind: PointerKind, x: f64, y: f64) -> PointerEvent {
        PointerEvent {
            kind,
            x,
            y,
            view: view(),
        }
    }

    fn model_with(c1: (f64, f64), c2: (f64, f64)) -> CursorModel {
        let mut model = CursorModel::new();
        model.cursors[0] = Cursor {
            x: c1.0,
            y: c1.1,
            visible: true,
        };
        model.cursors[1] = Cursor {
            x: c2.0,
            y: c2.1,
            visible: true,
        };
        model
    }

    #[test]
    fn press_drag_release_on_cursor_one() {
        let mut model = model_with((1.0, 1.0), (3.0, -2.0));

        assert!(model.handle(&event(PointerKind::Press, 1.0, 1.0)));
        assert_eq!(
            model.drag_state(),
            DragState::Dragging {
                cursor: CursorId::One,
                axis: DragAxis::Both
            }
        );

        assert!(model.handle(&event(PointerKind::Move, 1.5, 0.5)));
        assert_eq!(model.cursor(CursorId::One).x, 1.5);
        assert_eq!(model.cursor(CursorId::One).y, 0.5);

        assert!(model.handle(&event(PointerKind::Release, 1.5, 0.5)));
        assert_eq!(model.drag_state(), DragState::Idle);
    }

    #[test]
    fn single_axis_hits_move_one_coordinate() {
        let mut model = model_with((1.0, 1.0), (3.0, -2.0));

        // Same x as cursor 1, far in y.
        assert!(model.handle(&event(PointerKind::Press, 1.05, 3.5)));
        assert_eq!(
            model.drag_state(),
            DragState::Dragging {
                cursor: CursorId::One,
                axis: DragAxis::X
            }
        );
        model.handle(&event(PointerKind::Move, 2.0, -3.0));
        assert_eq!(model.cursor(CursorId::One).x, 2.0);
        assert_eq!(model.cursor(CursorId::One).y, 1.0);
        model.handle(&event(PointerKind::Release, 2.0, -3.0));

        // Same y as cursor 2, far in x from both.
        assert!(model.handle(&event(PointerKind::Press, 4.5, -2.01)));
        assert_eq!(
            model.drag_state(),
            DragState::Dragging {
                cursor: CursorId::Two,
                axis: DragAxis::Y
            }
        );
        model.handle(&event(PointerKind::Move, 0.0, 0.25));
        assert_eq!(model.cursor(CursorId::Two).x, 3.0);
        assert_eq!(model.cursor(CursorId::Two).y, 0.25);
    }

    #[test]
    fn cursor_one_wins_overlap() {
        let mut model = model_with((1.0, 1.0), (1.0, 1.0));
        model.handle(&event(PointerKind::Press, 1.0, 1.0));
        assert!(matches!(
            model.drag_state(),
            DragState::Dragging {
                cursor: CursorId::One,
                ..
            }
        ));
    }

    #[test]
    fn partial_hit_on_cursor_one_beats_full_hit_on_cursor_two() {
        let mut model = model_with((1.0, -3.0), (1.0, 2.0));
        model.handle(&event(PointerKind::Press, 1.0, 2.0));
        assert_eq!(
            model.drag_state(),
            DragState::Dragging {
                cursor: CursorId::One,
                axis: DragAxis::X
            }
        );
    }

    #[test]
    fn miss_stays_idle_and_is_unhandled() {
        let mut model = model_with((1.0, 1.0), (3.0, -2.0));
        assert!(!model.handle(&event(PointerKind::Press, 2.0, 0.0)));
        assert_eq!(model.drag_state(), DragState::Idle);
        assert!(!model.handle(&event(PointerKind::Move, 2.0, 0.0)));
        assert!(!model.handle(&event(PointerKind::Release, 2.0, 0.0)));
    }

    #[test]
    fn threshold_follows_the_event_view() {
        let mut model = model_with((0.0, 0.0), (10.0, 10.0));
        let press = |view| PointerEvent {
            kind: PointerKind::Press,
            x: 0.5,
            y: 0.5,
            view,
        };

        // Extent 8 gives threshold 0.08; 0.5 away misses.
        assert!(!model.handle(&press(view())));
        // Extent 100 gives threshold 1.0; now it hits.
        let wide = VisibleRange::new((0.0, 100.0), (-1.0, 1.0));
        assert!(model.handle(&press(wide)));
    }

    #[test]
    fn threshold_is_strict() {
        let mut model = model_with((0.0, 0.0), (50.0, 50.0));
        let view = VisibleRange::new((0.0, 100.0), (0.0, 100.0));
        let at_threshold = PointerEvent {
            kind: PointerKind::Press,
            x: 1.0,
            y: 1.0,
            view,
        };
        assert!(!model.handle(&at_threshold));
    }

    #[test]
    fn center_keeps_drag_state() {
        let mut model = model_with((1.0, 1.0), (3.0, -2.0));
        model.handle(&event(PointerKind::Press, 1.0, 1.0));
        let before = model.drag_state();

        model.center(CursorId::Two, &view());
        assert_eq!(model.cursor(CursorId::Two).x, 2.5e-5);
        assert_eq!(model.cursor(CursorId::Two).y, 0.0);
        assert_eq!(model.drag_state(), before);
    }

    #[test]
    fn values_report_absolute_deltas() {
        let mut model = model_with((3.0, 2.0), (1.0, 5.0));
        model.set_visible(CursorId::One, false);
        let v = model.values();
        assert_eq!((v.x1, v.y1, v.x2, v.y2), (3.0, 2.0, 1.0, 5.0));
        assert_eq!(v.dx, 2.0);
        assert_eq!(v.dy, 3.0);
        assert!(!model.cursor(CursorId::One).visible);
    }
}
