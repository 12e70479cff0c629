use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::events::{DispatchTables, Event, EventKind, Listener, ListenerId};
use crate::surface::Surface;

/// Stable identity of one state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(u64);

struct Record {
    /// Grouping key shared by records created for the same call site.
    id: String,
    alive: bool,
    /// Exclusive source of truth for this record's dispatch-table
    /// entries: kill removes exactly these, no more, no less.
    listeners: Vec<(EventKind, ListenerId)>,
    /// Back-references only; the record never owns a surface.
    surfaces: Vec<Weak<dyn Surface>>,
}

#[derive(Default)]
struct EngineState {
    records: HashMap<u64, Record>,
    buckets: HashMap<String, Vec<RecordId>>,
    /// All live records across all registries, insertion order. Focus
    /// cycling walks this list.
    live: Vec<RecordId>,
    /// Index into `live`, or `None` when nothing is focused.
    focus: Option<usize>,
    tables: DispatchTables,
    next_record: u64,
    next_listener: u64,
}

/// Process-wide runtime state shared by every subsystem: the record
/// arena, the global live-record list, the focus cursor, and the
/// per-kind listener tables.
///
/// Single-writer discipline, no locks: all mutation happens on dispatch
/// of a discrete event or a discrete tick on the loop thread, never in
/// parallel. Every public method releases its interior borrow before
/// invoking any caller-supplied code, so a listener may freely call
/// back into the engine (including killing the record it runs on).
#[derive(Clone, Default)]
pub struct Engine {
    state: Rc<RefCell<EngineState>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh live record under the given grouping id.
    pub fn create_record(&self, id: &str) -> RecordId {
        let mut state = self.state.borrow_mut();
        state.next_record += 1;
        let record = RecordId(state.next_record);
        state.records.insert(
            record.0,
            Record {
                id: id.to_string(),
                alive: true,
                listeners: Vec::new(),
                surfaces: Vec::new(),
            },
        );
        state.buckets.entry(id.to_string()).or_default().push(record);
        state.live.push(record);
        record
    }

    pub fn is_alive(&self, record: RecordId) -> bool {
        self.state
            .borrow()
            .records
            .get(&record.0)
            .map(|r| r.alive)
            .unwrap_or(false)
    }

    /// Register a listener in the per-kind dispatch table and in the
    /// record's own registration list. No-op on a dead record.
    pub fn listen(&self, record: RecordId, kind: EventKind, listener: Listener) -> ListenerId {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        let Some(entry) = state.records.get_mut(&record.0) else {
            return id;
        };
        if !entry.alive {
            return id;
        }
        entry.listeners.push((kind, id));
        state.tables.register(kind, id, listener);
        id
    }

    /// Tie the record's lifetime to a surface: when the surface
    /// unmounts, the record is killed. The first associated surface is
    /// the one focus navigation measures.
    pub fn associate(&self, record: RecordId, surface: &Rc<dyn Surface>) {
        {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.records.get_mut(&record.0) else {
                return;
            };
            if !entry.alive {
                return;
            }
            entry.surfaces.push(Rc::downgrade(surface));
        }
        let engine = self.clone();
        surface.on_unmount(Box::new(move || engine.kill(record)));
    }

    /// First associated surface that is still alive behind its weak
    /// reference, if any.
    pub fn first_surface(&self, record: RecordId) -> Option<Rc<dyn Surface>> {
        self.state
            .borrow()
            .records
            .get(&record.0)?
            .surfaces
            .first()?
            .upgrade()
    }

    /// Idempotent teardown: marks the record dead, unregisters exactly
    /// its own listeners, removes it from its id bucket and the live
    /// list (adjusting the focus index), then unmounts its surfaces.
    /// Safe to call from within a listener running on this record.
    pub fn kill(&self, record: RecordId) {
        let surfaces = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.records.get_mut(&record.0) else {
                return;
            };
            if !entry.alive {
                return;
            }
            entry.alive = false;
            let id = entry.id.clone();
            let listeners = std::mem::take(&mut entry.listeners);
            let surfaces = std::mem::take(&mut entry.surfaces);

            for (kind, listener) in listeners {
                state.tables.remove(kind, listener);
            }

            if let Some(bucket) = state.buckets.get_mut(&id) {
                bucket.retain(|member| *member != record);
                if bucket.is_empty() {
                    state.buckets.remove(&id);
                }
            }

            if let Some(position) = state.live.iter().position(|member| *member == record) {
                state.live.remove(position);
                state.focus = match state.focus {
                    Some(focused) if focused == position => None,
                    Some(focused) if focused > position => Some(focused - 1),
                    other => other,
                };
            }

            surfaces
        };

        // Borrow released: unmount hooks may re-enter the engine (the
        // record's own auto-kill hook re-enters as a no-op).
        for weak in surfaces {
            if let Some(surface) = weak.upgrade() {
                surface.unmount();
            }
        }
    }

    pub fn focus(&self, record: RecordId) {
        let mut state = self.state.borrow_mut();
        if let Some(position) = state.live.iter().position(|entry| *entry == record) {
            state.focus = Some(position);
        }
    }

    pub fn unfocus(&self) {
        self.state.borrow_mut().focus = None;
    }

    pub fn is_focused(&self, record: RecordId) -> bool {
        self.focused() == Some(record)
    }

    pub fn focused(&self) -> Option<RecordId> {
        let state = self.state.borrow();
        state.focus.and_then(|index| state.live.get(index).copied())
    }

    pub(crate) fn focused_index(&self) -> Option<usize> {
        self.state.borrow().focus
    }

    /// Snapshot of the live-record list in insertion order.
    pub fn live_records(&self) -> Vec<RecordId> {
        self.state.borrow().live.clone()
    }

    /// Fan an event out to every listener of its kind, in registration
    /// order. The table is snapshotted first and membership re-checked
    /// per entry, so listeners removed mid-dispatch are skipped and the
    /// rest are invoked exactly once.
    pub fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        let snapshot = self.state.borrow().tables.snapshot(kind);
        for (id, listener) in snapshot {
            let still_registered = self.state.borrow().tables.contains(kind, id);
            if still_registered {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.state.borrow().tables.len(kind)
    }
}

/// Factory-backed registry producing typed state records.
///
/// Every `state(id)` call constructs a new record, never a cached one.
/// Callers that want persistence across ticks hold onto the returned
/// handle themselves (typically a widget closure capturing it).
pub struct StateRegistry<T> {
    engine: Engine,
    factory: Rc<dyn Fn(&str) -> T>,
}

impl<T: 'static> StateRegistry<T> {
    pub fn new(engine: &Engine, factory: impl Fn(&str) -> T + 'static) -> Self {
        Self {
            engine: engine.clone(),
            factory: Rc::new(factory),
        }
    }

    /// Allocate a fresh record and build its state via the factory.
    /// Never fails.
    pub fn state(&self, id: &str) -> StateHandle<T> {
        let record = self.engine.create_record(id);
        let value = Rc::new(RefCell::new((self.factory)(id)));
        StateHandle {
            engine: self.engine.clone(),
            record,
            value,
        }
    }
}

/// Owning handle to one state record and its typed payload.
pub struct StateHandle<T> {
    engine: Engine,
    record: RecordId,
    value: Rc<RefCell<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            record: self.record,
            value: self.value.clone(),
        }
    }
}

impl<T> StateHandle<T> {
    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn is_alive(&self) -> bool {
        self.engine.is_alive(self.record)
    }

    /// Read or mutate the typed payload.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.value.borrow_mut())
    }

    pub fn listen(&self, kind: EventKind, listener: impl Fn(&Event) + 'static) -> ListenerId {
        self.engine.listen(self.record, kind, Rc::new(listener))
    }

    pub fn associate(&self, surface: &Rc<dyn Surface>) {
        self.engine.associate(self.record, surface);
    }

    pub fn focus(&self) {
        self.engine.focus(self.record);
    }

    pub fn unfocus(&self) {
        self.engine.unfocus();
    }

    pub fn is_focused(&self) -> bool {
        self.engine.is_focused(self.record)
    }

    pub fn kill(&self) {
        self.engine.kill(self.record);
    }
}
