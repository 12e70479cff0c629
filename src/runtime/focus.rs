use crate::registry::{Engine, RecordId};

/// Navigation direction for focus cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Focus navigation policy over the engine's live-record list.
///
/// At most one record is focused at a time. Cycling walks the list in
/// insertion order with wraparound and skips records that cannot
/// currently be seen; eligibility is evaluated lazily at navigation
/// time, never cached.
#[derive(Clone)]
pub struct FocusManager {
    engine: Engine,
}

impl FocusManager {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
        }
    }

    pub fn focus(&self, record: RecordId) {
        self.engine.focus(record);
    }

    pub fn unfocus(&self) {
        self.engine.unfocus();
    }

    pub fn focused(&self) -> Option<RecordId> {
        self.engine.focused()
    }

    /// Move focus to the next eligible record in `direction`, starting
    /// one past the current index and wrapping. A record is eligible
    /// when its first associated surface is visible with a nonzero
    /// measured width. If a full wrap finds nothing eligible, focus is
    /// left unchanged.
    pub fn advance(&self, direction: Direction) {
        let live = self.engine.live_records();
        let len = live.len();
        if len == 0 {
            return;
        }

        let start = match (self.engine.focused_index(), direction) {
            (Some(index), _) => index,
            (None, Direction::Forward) => len - 1,
            (None, Direction::Backward) => 0,
        };

        for step in 1..=len {
            let index = match direction {
                Direction::Forward => (start + step) % len,
                Direction::Backward => (start + len - (step % len)) % len,
            };
            let record = live[index];
            if self.eligible(record) {
                self.engine.focus(record);
                return;
            }
        }
    }

    fn eligible(&self, record: RecordId) -> bool {
        // Measurement runs outside any engine borrow; surfaces are
        // arbitrary collaborator code.
        match self.engine.first_surface(record) {
            Some(surface) => surface.is_visible() && surface.computed_width() > 0,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{StateHandle, StateRegistry};
    use crate::surface::{Surface, TextSurface};
    use std::rc::Rc;

    fn widget(registry: &StateRegistry<()>, id: &str, content: &str) -> (StateHandle<()>, Rc<TextSurface>) {
        let handle = registry.state(id);
        let surface = TextSurface::new(content);
        let dynamic: Rc<dyn Surface> = surface.clone();
        handle.associate(&dynamic);
        (handle, surface)
    }

    fn setup(engine: &Engine) -> StateRegistry<()> {
        StateRegistry::new(engine, |_| ())
    }

    #[test]
    fn advance_skips_zero_width_records() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let (first, _s1) = widget(&registry, "a", "aa");
        let (_middle, s2) = widget(&registry, "b", "bb");
        let (third, _s3) = widget(&registry, "c", "cc");

        s2.set_rect(None);
        first.focus();

        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Forward);
        assert!(third.is_focused());
    }

    #[test]
    fn advance_wraps_around() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let (first, _s1) = widget(&registry, "a", "aa");
        let (last, _s2) = widget(&registry, "b", "bb");

        last.focus();
        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Forward);
        assert!(first.is_focused());
    }

    #[test]
    fn advance_backward_from_nothing_starts_at_the_end() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let (_first, _s1) = widget(&registry, "a", "aa");
        let (last, _s2) = widget(&registry, "b", "bb");

        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Backward);
        assert!(last.is_focused());
    }

    #[test]
    fn no_eligible_record_leaves_focus_unchanged() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let (first, _s1) = widget(&registry, "a", "aa");
        let (_second, s2) = widget(&registry, "b", "bb");

        s2.set_visible(false);
        first.focus();

        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Forward);
        // Full wrap lands back on the already-focused record.
        assert!(first.is_focused());
    }

    #[test]
    fn records_without_surfaces_are_skipped() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let bare = registry.state("bare");
        let (widgeted, _s) = widget(&registry, "w", "ww");

        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Forward);
        assert!(widgeted.is_focused());
        assert!(!bare.is_focused());
    }

    #[test]
    fn visibility_is_evaluated_at_navigation_time() {
        let engine = Engine::new();
        let registry = setup(&engine);
        let (first, _s1) = widget(&registry, "a", "aa");
        let (second, s2) = widget(&registry, "b", "bb");

        s2.set_visible(false);
        first.focus();
        let manager = FocusManager::new(&engine);
        manager.advance(Direction::Forward);
        assert!(first.is_focused());

        // Becomes visible between navigation events: immediately
        // eligible again.
        s2.set_visible(true);
        manager.advance(Direction::Forward);
        assert!(second.is_focused());
    }
}
