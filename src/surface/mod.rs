//! Contract for the external layout/render engine.
//!
//! The runtime never lays anything out itself; it composites whatever a
//! [`Surface`] renders and asks it for measurement when deciding focus
//! eligibility. The unmount subscription is a back-reference: a state
//! record registers a hook here and the surface fires it exactly once
//! when it leaves the tree, so records never own surface lifetimes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::geometry::Rect;
use crate::width::display_width;

/// Hook invoked once when a surface is unmounted.
pub type UnmountHook = Box<dyn FnOnce()>;

/// A positioned, styled renderable node produced by the layout engine.
pub trait Surface {
    /// Render the surface (and its children) to a style-annotated
    /// frame string.
    fn render(&self) -> String;

    /// Solved rectangle in terminal cells, or `None` while unmeasured.
    fn bounding_rect(&self) -> Option<Rect>;

    /// Measured width in cells; zero while unmeasured or collapsed.
    fn computed_width(&self) -> u16 {
        self.bounding_rect().map(|rect| rect.width).unwrap_or(0)
    }

    /// Whether the surface currently participates in rendering.
    fn is_visible(&self) -> bool {
        self.bounding_rect().map(|rect| !rect.is_empty()).unwrap_or(false)
    }

    /// Subscribe to the surface leaving the tree. Hooks registered
    /// after unmount fire immediately.
    fn on_unmount(&self, hook: UnmountHook);

    /// Detach the surface, firing every pending unmount hook once.
    fn unmount(&self);
}

/// Minimal concrete surface: static multi-line content at a fixed
/// position. Enough for demos and for exercising the runtime in tests;
/// real component libraries bring their own layout-backed surfaces.
pub struct TextSurface {
    content: RefCell<String>,
    rect: Cell<Option<Rect>>,
    visible: Cell<bool>,
    mounted: Cell<bool>,
    unmount_hooks: RefCell<Vec<UnmountHook>>,
}

impl TextSurface {
    pub fn new(content: impl Into<String>) -> Rc<Self> {
        let content = content.into();
        let rect = measure(&content);
        Rc::new(Self {
            content: RefCell::new(content),
            rect: Cell::new(Some(rect)),
            visible: Cell::new(true),
            mounted: Cell::new(true),
            unmount_hooks: RefCell::new(Vec::new()),
        })
    }

    pub fn set_content(&self, content: impl Into<String>) {
        let content = content.into();
        self.rect.set(Some(measure(&content)));
        *self.content.borrow_mut() = content;
    }

    /// Override the measured rectangle (`None` marks the surface as
    /// unmeasured, which makes it ineligible for focus navigation).
    pub fn set_rect(&self, rect: Option<Rect>) {
        self.rect.set(rect);
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }
}

fn measure(content: &str) -> Rect {
    let width = content
        .lines()
        .map(display_width)
        .max()
        .unwrap_or(0)
        .min(u16::MAX as usize) as u16;
    let height = content.lines().count().min(u16::MAX as usize) as u16;
    Rect::new(0, 0, width, height)
}

impl Surface for TextSurface {
    fn render(&self) -> String {
        self.content.borrow().clone()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        self.rect.get()
    }

    fn is_visible(&self) -> bool {
        self.mounted.get()
            && self.visible.get()
            && self.rect.get().map(|rect| !rect.is_empty()).unwrap_or(false)
    }

    fn on_unmount(&self, hook: UnmountHook) {
        if self.mounted.get() {
            self.unmount_hooks.borrow_mut().push(hook);
        } else {
            hook();
        }
    }

    fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        // Drain before invoking so a hook re-registering (or unmounting
        // again) cannot corrupt the iteration.
        let hooks: Vec<UnmountHook> = self.unmount_hooks.borrow_mut().drain(..).collect();
        for hook in hooks {
            hook();
        }
    }
}
