use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use serde_json::json;

use crate::diff::AnsiDiffer;
use crate::error::Result;
use crate::events::Event;
use crate::geometry::Size;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::RuntimeMetrics;
use crate::registry::Engine;
use crate::surface::Surface;

pub mod driver;
pub mod focus;

use focus::{Direction, FocusManager};

/// Configuration knobs for the runtime loop.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Interval between periodic draw ticks.
    pub tick_interval: Duration,
    /// Quiet period after the last resize notification before the
    /// debounced redraw fires, superseding any pending tick.
    pub resize_debounce: Duration,
    /// Optional structured logger used by the runtime.
    pub logger: Option<Logger>,
    /// Metrics accumulator used for periodic snapshots.
    pub metrics: Option<Arc<Mutex<RuntimeMetrics>>>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            resize_debounce: Duration::from_millis(8),
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(5),
            metrics_target: "greenroom::runtime.metrics".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(RuntimeMetrics::new())));
        }
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<RuntimeMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Guaranteed-once cleanup action for a terminal-global resource.
/// Sanitizers run in registration order on close; failures are logged
/// and swallowed (restoring a mode that was never entered is not
/// user-visible harm).
pub type Sanitizer = Box<dyn FnOnce() -> std::io::Result<()>>;

/// The runtime façade: owns the root surface, the differ, the shared
/// engine state, the sanitizer list, and the exit flag, and drives the
/// combined input/draw loop.
pub struct Runtime {
    engine: Engine,
    focus: FocusManager,
    differ: AnsiDiffer,
    config: RuntimeConfig,
    root: Option<Rc<dyn Surface>>,
    sanitizers: Vec<Sanitizer>,
    exit: bool,
    last_frame_hash: Option<blake3::Hash>,
    start_instant: Option<Instant>,
    last_metrics_emit: Option<Instant>,
}

impl Runtime {
    pub fn new(initial_size: Size) -> Self {
        let engine = Engine::new();
        let focus = FocusManager::new(&engine);
        Self {
            engine,
            focus,
            differ: AnsiDiffer::new(initial_size),
            config: RuntimeConfig::default(),
            root: None,
            sanitizers: Vec::new(),
            exit: false,
            last_frame_hash: None,
            start_instant: None,
            last_metrics_emit: None,
        }
    }

    /// Shared engine state; widget constructors clone this handle.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn focus_manager(&self) -> &FocusManager {
        &self.focus
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn add_sanitizer(&mut self, sanitizer: impl FnOnce() -> std::io::Result<()> + 'static) {
        self.sanitizers.push(Box::new(sanitizer));
    }

    /// Evaluate the component entry point once and take its surface as
    /// the root of every subsequent frame.
    pub fn mount(&mut self, component: impl FnOnce() -> Rc<dyn Surface>) {
        self.root = Some(component());
        self.last_frame_hash = None;
    }

    /// Adopt new terminal dimensions: the differ drops its previous
    /// frame, then all `resize` listeners fire with the new size.
    pub fn resize(&mut self, size: Size) {
        self.differ.update_size(size);
        self.last_frame_hash = None;
        self.dispatch(&Event::Resize(size));
        self.record_resize_metric();
        self.log_runtime_event(
            LogLevel::Info,
            "resized",
            [
                json_kv("width", json!(size.width)),
                json_kv("height", json!(size.height)),
            ],
        );
    }

    /// Mount the component and run the interactive loop until exit.
    /// Sanitizers run exactly once afterwards, whichever way the loop
    /// ends.
    pub fn render<W: Write>(
        &mut self,
        out: &mut W,
        component: impl FnOnce() -> Rc<dyn Surface>,
    ) -> Result<()> {
        self.bootstrap();
        self.mount(component);
        let result = self.run_loop(out);
        self.close();
        result
    }

    /// Replay a fixed event sequence against an arbitrary writer.
    /// `Event::Update` stands in for a draw tick. Used by tests and
    /// benches; no terminal, timers, or input polling involved.
    pub fn run_scripted<W, I>(&mut self, out: &mut W, events: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = Event>,
    {
        self.bootstrap();
        self.draw(out)?;
        for event in events {
            match event {
                Event::Update => self.draw(out)?,
                Event::Resize(size) => self.resize(size),
                Event::Key(key) => self.handle_key(key),
                Event::Mouse(mouse) => self.dispatch(&Event::Mouse(mouse)),
            }
            if self.exit {
                break;
            }
        }
        self.close();
        Ok(())
    }

    fn run_loop<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let mut next_draw = Instant::now();

        while !self.exit {
            let now = Instant::now();
            if now >= next_draw {
                self.draw(out)?;
                if self.exit {
                    break;
                }
                next_draw = Instant::now() + self.config.tick_interval;
                continue;
            }

            let timeout = next_draw.saturating_duration_since(now);
            if event::poll(timeout)? {
                match event::read()? {
                    CrosstermEvent::Resize(..) => {
                        // Dimensions are re-queried rather than taken
                        // from the notification payload.
                        let (width, height) = terminal::size()?;
                        self.resize(Size::new(width, height));
                        // The debounced redraw supersedes the pending
                        // tick, collapsing resize bursts to one draw.
                        next_draw = Instant::now() + self.config.resize_debounce;
                    }
                    CrosstermEvent::Key(key) => self.handle_key(key),
                    CrosstermEvent::Mouse(mouse) => self.dispatch(&Event::Mouse(mouse)),
                    _ => {}
                }
            }

            self.maybe_emit_metrics();
        }

        Ok(())
    }

    /// One draw cycle: `update` listeners first (all of them, every
    /// tick), then the frame is captured, diffed, and written. No
    /// listener ever observes a half-rendered frame.
    fn draw<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.dispatch(&Event::Update);

        let Some(root) = self.root.clone() else {
            return Ok(());
        };
        let frame = root.render();

        let hash = blake3::hash(frame.as_bytes());
        if self.last_frame_hash == Some(hash) {
            self.record_skipped_frame_metric();
            return Ok(());
        }
        self.last_frame_hash = Some(hash);

        let patch = self.differ.diff(&frame);
        out.write_all(b"\x1b[1;1H")?;
        out.write_all(patch.as_bytes())?;
        out.flush()?;
        self.record_frame_metric(patch.len());
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.exit = true;
            self.log_runtime_event(LogLevel::Info, "exit_requested", std::iter::empty());
            return;
        }

        match key.code {
            KeyCode::Tab => self.focus.advance(Direction::Forward),
            KeyCode::BackTab => self.focus.advance(Direction::Backward),
            _ => self.dispatch(&Event::Key(key)),
        }
    }

    fn dispatch(&mut self, event: &Event) {
        self.engine.dispatch(event);
        self.record_event_metric();
    }

    /// Set the exit flag and run every registered sanitizer exactly
    /// once, in registration order. The loop has already stopped by the
    /// time sanitizers run, so no draw can land on a restored terminal.
    pub fn close(&mut self) {
        self.exit = true;
        let sanitizers = std::mem::take(&mut self.sanitizers);
        for sanitizer in sanitizers {
            if let Err(err) = sanitizer() {
                self.log_runtime_event(
                    LogLevel::Warn,
                    "sanitizer_failed",
                    [json_kv("error", json!(err.to_string()))],
                );
            }
        }

        let uptime_ms = self
            .start_instant
            .map(|start| start.elapsed().as_millis())
            .unwrap_or(0);
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
    }

    fn bootstrap(&mut self) {
        self.exit = false;
        self.ensure_metrics_initialized();
        let now = Instant::now();
        self.start_instant = Some(now);
        self.last_metrics_emit = Some(now);
        let size = self.differ.size();
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_started",
            [
                json_kv("width", json!(size.width)),
                json_kv("height", json!(size.height)),
            ],
        );
    }

    fn ensure_metrics_initialized(&mut self) {
        if self.config.metrics.is_none() && self.config.metrics_interval > Duration::ZERO {
            self.config.metrics = Some(Arc::new(Mutex::new(RuntimeMetrics::new())));
        }
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, "greenroom::runtime", message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn record_event_metric(&mut self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_event();
            }
        }
    }

    fn record_frame_metric(&mut self, patch_bytes: usize) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_frame(patch_bytes);
            }
        }
    }

    fn record_skipped_frame_metric(&mut self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_skipped_frame();
            }
        }
    }

    fn record_resize_metric(&mut self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_resize();
            }
        }
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics.is_none() || self.config.metrics_interval == Duration::ZERO {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => {
                return;
            }
            _ => {
                self.last_metrics_emit = Some(now);
            }
        }

        let uptime = self
            .start_instant
            .map(|start| now.duration_since(start))
            .unwrap_or_default();

        if let (Some(logger), Some(metrics)) =
            (self.config.logger.as_ref(), self.config.metrics.as_ref())
        {
            if let Ok(guard) = metrics.lock() {
                let target = self.config.metrics_target.as_str();
                let event = guard.snapshot(uptime).to_log_event(target);
                let _ = logger.log_event(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::registry::StateRegistry;
    use crate::surface::TextSurface;
    use std::cell::RefCell;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn runtime() -> Runtime {
        Runtime::new(Size::new(80, 24))
    }

    #[test]
    fn first_scripted_draw_emits_the_full_frame() {
        let mut runtime = runtime();
        let surface = TextSurface::new("hello");
        runtime.mount(|| surface.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime.run_scripted(&mut out, std::iter::empty()).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written, "\x1b[1;1Hhello");
    }

    #[test]
    fn unchanged_frame_is_skipped_entirely() {
        let mut runtime = runtime();
        let surface = TextSurface::new("stable");
        runtime.mount(|| surface.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime
            .run_scripted(&mut out, vec![Event::Update, Event::Update])
            .unwrap();
        let written = String::from_utf8(out).unwrap();
        // Only the first paint reaches the writer.
        assert_eq!(written, "\x1b[1;1Hstable");
    }

    #[test]
    fn content_change_writes_a_minimal_patch() {
        let mut runtime = runtime();
        let surface = TextSurface::new("AAA");
        runtime.mount(|| surface.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        let updating = surface.clone();
        runtime
            .run_scripted(
                &mut out,
                vec![Event::Update].into_iter().inspect(move |_| {
                    updating.set_content("ABA");
                }),
            )
            .unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written, "\x1b[1;1HAAA\x1b[1;1H\x1b[0m\x1b[1;2HB\x1b[0m");
    }

    #[test]
    fn update_listeners_run_before_the_frame_is_captured() {
        let mut runtime = runtime();
        let registry = StateRegistry::new(runtime.engine(), |_| ());
        let first = registry.state("a");
        let second = registry.state("b");
        first.focus();

        let observations: Rc<RefCell<Vec<(String, bool, bool)>>> =
            Rc::new(RefCell::new(Vec::new()));

        let log = observations.clone();
        let (a, b) = (first.clone(), second.clone());
        first.listen(EventKind::Update, move |_| {
            log.borrow_mut()
                .push(("first".into(), a.is_focused(), b.is_focused()));
        });
        let log = observations.clone();
        let (a, b) = (first.clone(), second.clone());
        second.listen(EventKind::Update, move |_| {
            log.borrow_mut()
                .push(("second".into(), a.is_focused(), b.is_focused()));
        });

        // The surface records when it was rendered relative to the
        // listeners.
        struct Probe {
            log: Rc<RefCell<Vec<(String, bool, bool)>>>,
        }
        impl Surface for Probe {
            fn render(&self) -> String {
                self.log.borrow_mut().push(("render".into(), false, false));
                "frame".into()
            }
            fn bounding_rect(&self) -> Option<crate::geometry::Rect> {
                Some(crate::geometry::Rect::new(0, 0, 5, 1))
            }
            fn on_unmount(&self, _hook: crate::surface::UnmountHook) {}
            fn unmount(&self) {}
        }

        let probe = Rc::new(Probe {
            log: observations.clone(),
        });
        runtime.mount(|| probe as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime.run_scripted(&mut out, std::iter::empty()).unwrap();

        let seen = observations.borrow();
        let order: Vec<&str> = seen.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "render"]);
        // Both listeners observed identical focus state.
        assert_eq!(seen[0].1, seen[1].1);
        assert_eq!(seen[0].2, seen[1].2);
    }

    #[test]
    fn tab_cycles_focus_between_widgets() {
        let mut runtime = runtime();
        let registry = StateRegistry::new(runtime.engine(), |_| ());

        let first = registry.state("a");
        let surface_a = TextSurface::new("aa");
        first.associate(&(surface_a.clone() as Rc<dyn Surface>));
        let second = registry.state("b");
        let surface_b = TextSurface::new("bb");
        second.associate(&(surface_b.clone() as Rc<dyn Surface>));

        let root = TextSurface::new("aa bb");
        runtime.mount(|| root.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime
            .run_scripted(&mut out, vec![key(KeyCode::Tab)])
            .unwrap();
        assert!(first.is_focused());

        let mut out = Vec::new();
        runtime
            .run_scripted(&mut out, vec![key(KeyCode::Tab), key(KeyCode::BackTab)])
            .unwrap();
        assert!(first.is_focused());
    }

    #[test]
    fn key_events_reach_key_listeners_but_tab_does_not() {
        let mut runtime = runtime();
        let registry = StateRegistry::new(runtime.engine(), |_| 0u32);
        let handle = registry.state("w");
        let seen = handle.clone();
        handle.listen(EventKind::Key, move |_| seen.with(|count| *count += 1));

        let root = TextSurface::new("x");
        runtime.mount(|| root.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime
            .run_scripted(
                &mut out,
                vec![key(KeyCode::Char('x')), key(KeyCode::Tab), key(KeyCode::Enter)],
            )
            .unwrap();
        assert_eq!(handle.with(|count| *count), 2);
    }

    #[test]
    fn ctrl_c_stops_the_scripted_run() {
        let mut runtime = runtime();
        let registry = StateRegistry::new(runtime.engine(), |_| 0u32);
        let handle = registry.state("w");
        let seen = handle.clone();
        handle.listen(EventKind::Key, move |_| seen.with(|count| *count += 1));

        let root = TextSurface::new("x");
        runtime.mount(|| root.clone() as Rc<dyn Surface>);

        let interrupt = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        let mut out = Vec::new();
        runtime
            .run_scripted(&mut out, vec![interrupt, key(KeyCode::Char('x'))])
            .unwrap();
        // Nothing after the interrupt is dispatched.
        assert_eq!(handle.with(|count| *count), 0);
    }

    #[test]
    fn resize_fires_listeners_and_forces_full_redraw() {
        let mut runtime = runtime();
        let registry = StateRegistry::new(runtime.engine(), |_| None::<Size>);
        let handle = registry.state("w");
        let seen = handle.clone();
        handle.listen(EventKind::Resize, move |event| {
            if let Event::Resize(size) = event {
                seen.with(|slot| *slot = Some(*size));
            }
        });

        let surface = TextSurface::new("zzz");
        runtime.mount(|| surface.clone() as Rc<dyn Surface>);

        let mut out = Vec::new();
        runtime
            .run_scripted(
                &mut out,
                vec![Event::Resize(Size::new(40, 12)), Event::Update],
            )
            .unwrap();

        assert_eq!(handle.with(|slot| *slot), Some(Size::new(40, 12)));
        let written = String::from_utf8(out).unwrap();
        // Full frame emitted twice: first paint plus post-resize redraw.
        assert_eq!(written, "\x1b[1;1Hzzz\x1b[1;1Hzzz");
    }

    #[test]
    fn sanitizers_run_once_in_registration_order() {
        let mut runtime = runtime();
        let order: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        runtime.add_sanitizer(move || {
            log.borrow_mut().push(1);
            Ok(())
        });
        let log = order.clone();
        runtime.add_sanitizer(move || {
            log.borrow_mut().push(2);
            Err(std::io::Error::other("already torn down"))
        });
        let log = order.clone();
        runtime.add_sanitizer(move || {
            log.borrow_mut().push(3);
            Ok(())
        });

        runtime.close();
        runtime.close();
        assert_eq!(&*order.borrow(), &[1, 2, 3]);
    }
}
