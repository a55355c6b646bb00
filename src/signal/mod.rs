//! Notification channels for stage events.
//!
//! A [`Signal`] replaces ad hoc event callbacks with an explicit channel:
//! one-shot signals (end, finish, error, close) deliver at most once over
//! the stage's lifetime, repeating signals (data, readable, drain) deliver
//! every time the stage emits them. Once a signal is closed nothing is
//! delivered anymore, which is how aborted stages guarantee silence.
//!
//! Signals are owned by their stage and are never shared across tasks, so
//! they carry no synchronization of their own.

use std::fmt;

type OnceFn<E> = Box<dyn FnOnce(&E) + Send>;
type EveryFn<E> = Box<dyn FnMut(&E) + Send>;

enum Listener<E> {
    Once(OnceFn<E>),
    Every(EveryFn<E>),
}

/// A registrable notification channel.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use chunkflow::Signal;
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let mut finish: Signal<()> = Signal::one_shot();
///
/// let counter = hits.clone();
/// finish.on(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert!(finish.emit(&()));
/// assert!(!finish.emit(&()));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct Signal<E> {
    listeners: Vec<Listener<E>>,
    one_shot: bool,
    emitted: usize,
    closed: bool,
}

impl<E> Signal<E> {
    /// A signal that is delivered at most once.
    pub fn one_shot() -> Self {
        Self {
            listeners: Vec::new(),
            one_shot: true,
            emitted: 0,
            closed: false,
        }
    }

    /// A signal that is delivered on every emission.
    pub fn repeating() -> Self {
        Self {
            one_shot: false,
            ..Self::one_shot()
        }
    }

    /// Registers a listener called on every delivery.
    pub fn on(&mut self, f: impl FnMut(&E) + Send + 'static) {
        if !self.closed {
            self.listeners.push(Listener::Every(Box::new(f)));
        }
    }

    /// Registers a listener called on the next delivery only.
    pub fn once(&mut self, f: impl FnOnce(&E) + Send + 'static) {
        if !self.closed {
            self.listeners.push(Listener::Once(Box::new(f)));
        }
    }

    /// Delivers `event` to the registered listeners.
    ///
    /// Returns false, delivering nothing, if the signal is closed or is a
    /// one-shot signal that already fired.
    pub fn emit(&mut self, event: &E) -> bool {
        if self.closed || (self.one_shot && self.emitted > 0) {
            return false;
        }
        self.emitted += 1;

        let listeners = std::mem::take(&mut self.listeners);
        for listener in listeners {
            match listener {
                Listener::Once(f) => f(event),
                Listener::Every(mut f) => {
                    f(event);
                    if !self.one_shot {
                        self.listeners.push(Listener::Every(f));
                    }
                }
            }
        }
        true
    }

    /// Number of deliveries so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Returns true if a one-shot signal already fired.
    pub fn has_fired(&self) -> bool {
        self.emitted > 0
    }

    /// Drops all listeners and refuses every future emission.
    pub fn close(&mut self) {
        self.closed = true;
        self.listeners.clear();
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .field("one_shot", &self.one_shot)
            .field("emitted", &self.emitted)
            .field("closed", &self.closed)
            .finish()
    }
}
