//! Event model shared by the registry and the runtime loop.
//!
//! Input decoding itself is crossterm's job; the runtime only fans the
//! decoded events out to listeners registered through state records.

use std::rc::Rc;

use crossterm::event::{KeyEvent, MouseEvent};

use crate::geometry::Size;

/// Events delivered to listeners registered through the state registry.
#[derive(Debug, Clone)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Fired once per draw cycle, before the frame is captured.
    Update,
    Resize(Size),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Key(_) => EventKind::Key,
            Event::Mouse(_) => EventKind::Mouse,
            Event::Update => EventKind::Update,
            Event::Resize(_) => EventKind::Resize,
        }
    }
}

/// The four listener registration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Key,
    Mouse,
    Update,
    Resize,
}

/// Listener callback. Listeners run to completion on the loop thread;
/// they are never invoked re-entrantly for the same event.
pub type Listener = Rc<dyn Fn(&Event)>;

/// Handle identifying one registration inside the dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// One ordered listener list per event kind.
#[derive(Default)]
pub struct DispatchTables {
    key: Vec<(ListenerId, Listener)>,
    mouse: Vec<(ListenerId, Listener)>,
    update: Vec<(ListenerId, Listener)>,
    resize: Vec<(ListenerId, Listener)>,
}

impl DispatchTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: EventKind) -> &Vec<(ListenerId, Listener)> {
        match kind {
            EventKind::Key => &self.key,
            EventKind::Mouse => &self.mouse,
            EventKind::Update => &self.update,
            EventKind::Resize => &self.resize,
        }
    }

    fn table_mut(&mut self, kind: EventKind) -> &mut Vec<(ListenerId, Listener)> {
        match kind {
            EventKind::Key => &mut self.key,
            EventKind::Mouse => &mut self.mouse,
            EventKind::Update => &mut self.update,
            EventKind::Resize => &mut self.resize,
        }
    }

    pub fn register(&mut self, kind: EventKind, id: ListenerId, listener: Listener) {
        self.table_mut(kind).push((id, listener));
    }

    /// Remove one registration. Returns false when the id is unknown,
    /// which callers treat as a no-op.
    pub fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let table = self.table_mut(kind);
        match table.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                table.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, kind: EventKind, id: ListenerId) -> bool {
        self.table(kind).iter().any(|(entry, _)| *entry == id)
    }

    /// Clone the current registration order for dispatch. Dispatchers
    /// iterate the snapshot and re-check membership per entry, so a
    /// listener removing itself (or others) mid-dispatch cannot skip
    /// or double-invoke anyone in the same pass.
    pub fn snapshot(&self, kind: EventKind) -> Vec<(ListenerId, Listener)> {
        self.table(kind).to_vec()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.table(kind).len()
    }

    pub fn is_empty(&self, kind: EventKind) -> bool {
        self.table(kind).is_empty()
    }
}
