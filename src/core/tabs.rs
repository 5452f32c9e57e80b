//! Partition of session ids between the capacity-bounded visible tab row
//! and the unbounded overflow list.
//!
//! Eviction is FIFO: "oldest" means least-recently-appended to the visible
//! row, not least-recently-used. The active session is always visible;
//! selecting an overflow session promotes it first.

use crate::core::store::SessionId;

pub const MAX_VISIBLE_TABS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Tabs,
    Overflow,
}

/// Transient pointer-gesture state. Exists only while a drag is in
/// progress; cleared unconditionally on release or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragState {
    pub dragged: SessionId,
    pub source: Zone,
    pub hover: Option<Zone>,
}

#[derive(Debug)]
pub struct TabLayout {
    capacity: usize,
    visible: Vec<SessionId>,
    overflow: Vec<SessionId>,
    active: SessionId,
    drag: Option<DragState>,
}

impl TabLayout {
    pub fn new(first: SessionId, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            visible: vec![first],
            overflow: Vec::new(),
            active: first,
            drag: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn visible(&self) -> &[SessionId] {
        &self.visible
    }

    pub fn overflow(&self) -> &[SessionId] {
        &self.overflow
    }

    pub fn active(&self) -> SessionId {
        self.active
    }

    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn zone_of(&self, id: SessionId) -> Option<Zone> {
        if self.visible.contains(&id) {
            Some(Zone::Tabs)
        } else if self.overflow.contains(&id) {
            Some(Zone::Overflow)
        } else {
            None
        }
    }

    /// Place a newly created session. Evicts the oldest visible tab to the
    /// overflow front when the row is full. The new session becomes active.
    pub fn add(&mut self, id: SessionId) {
        if self.visible.len() >= self.capacity {
            let evicted = self.visible.remove(0);
            self.overflow.insert(0, evicted);
        }
        self.visible.push(id);
        self.active = id;
    }

    /// Make a session active, promoting it out of overflow if needed.
    /// Returns false for ids this layout does not track.
    pub fn activate(&mut self, id: SessionId) -> bool {
        match self.zone_of(id) {
            Some(Zone::Tabs) => {
                self.active = id;
                true
            }
            Some(Zone::Overflow) => {
                self.promote(id);
                true
            }
            None => false,
        }
    }

    /// Move an overflow session into the visible row and activate it.
    pub fn promote(&mut self, id: SessionId) {
        let Some(pos) = self.overflow.iter().position(|&o| o == id) else {
            return;
        };
        self.overflow.remove(pos);
        if self.visible.len() >= self.capacity {
            let evicted = self.visible.remove(0);
            self.overflow.insert(0, evicted);
        }
        self.visible.push(id);
        self.active = id;
    }

    /// Move a visible session to the overflow front. If it was active, the
    /// replacement is chosen as on close. Demoting the only visible tab
    /// pulls the overflow front into the row first; with no overflow to
    /// pull from it is refused, since the row can never be left empty.
    pub fn demote(&mut self, id: SessionId) {
        let Some(pos) = self.visible.iter().position(|&v| v == id) else {
            return;
        };
        if self.visible.len() == 1 {
            if self.overflow.is_empty() {
                return;
            }
            let promoted = self.overflow.remove(0);
            self.visible.push(promoted);
        }
        self.visible.remove(pos);
        self.overflow.insert(0, id);
        if self.active == id {
            self.pick_active_near(pos);
        }
    }

    /// Remove a closed session from whichever set holds it, refilling the
    /// visible row from overflow when a slot opens up.
    pub fn close(&mut self, id: SessionId) {
        if let Some(pos) = self.visible.iter().position(|&v| v == id) {
            self.visible.remove(pos);
            if !self.overflow.is_empty() {
                let promoted = self.overflow.remove(0);
                self.visible.push(promoted);
            }
            if self.active == id {
                self.pick_active_near(pos);
            }
        } else if let Some(pos) = self.overflow.iter().position(|&o| o == id) {
            self.overflow.remove(pos);
        }
        if let Some(drag) = self.drag {
            if drag.dragged == id {
                self.drag = None;
            }
        }
    }

    fn pick_active_near(&mut self, removed_pos: usize) {
        if self.visible.is_empty() {
            // Reachable only when the layout tracks no sessions at all; the
            // store refuses to close the last session before we get here.
            panic!("tab layout left without a visible session");
        }
        let pos = removed_pos.min(self.visible.len() - 1);
        self.active = self.visible[pos];
    }

    pub fn begin_drag(&mut self, id: SessionId) -> bool {
        match self.zone_of(id) {
            Some(source) => {
                self.drag = Some(DragState {
                    dragged: id,
                    source,
                    hover: None,
                });
                true
            }
            None => false,
        }
    }

    pub fn drag_hover(&mut self, zone: Zone) {
        if let Some(drag) = self.drag.as_mut() {
            drag.hover = Some(zone);
        }
    }

    /// Resolve the gesture: dropping on the opposite zone promotes or
    /// demotes; anything else is a no-op. The transient state is cleared in
    /// every case.
    pub fn end_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        match (drag.source, drag.hover) {
            (Zone::Tabs, Some(Zone::Overflow)) => self.demote(drag.dragged),
            (Zone::Overflow, Some(Zone::Tabs)) => self.promote(drag.dragged),
            _ => {}
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        assert!(self.visible.len() <= self.capacity, "visible over capacity");
        assert!(!self.visible.is_empty(), "visible row empty");
        for id in &self.visible {
            assert!(!self.overflow.contains(id), "partitions overlap");
        }
        assert!(self.visible.contains(&self.active), "active not visible");
    }
}
