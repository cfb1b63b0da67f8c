use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use serde_json::Value;
use smallvec::SmallVec;

use crate::Dispose;

bitflags! {
    /// How a watcher reacts to writes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WatchOptions: u8 {
        /// Fire on every write, even when the watched value compares equal.
        const DEEP = 1 << 0;
        /// Fire inside the write instead of waiting for the next flush.
        const SYNC = 1 << 1;
        /// Fire once at registration with `Value::Null` as the old value.
        const IMMEDIATE = 1 << 2;
    }
}

pub type WatchSource = Rc<dyn Fn() -> Value>;
pub type WatchCallback = Box<dyn FnMut(&Value, &Value)>;

/// A state tree whose writes are observable.
///
/// Reads never notify. Every write bumps `version`, runs `SYNC` watchers
/// before returning, and queues the others until `flush`.
pub trait Observable {
    fn read(&self, f: &mut dyn FnMut(&Value));
    fn write(&self, f: &mut dyn FnMut(&mut Value));
    /// Swaps the whole tree, returning the previous one.
    fn replace(&self, value: Value) -> Value;
    /// Notifies watchers without changing anything.
    fn touch(&self);
    fn version(&self) -> u64;
    fn watch(&self, source: WatchSource, callback: WatchCallback, options: WatchOptions)
    -> Dispose;
    /// Runs queued (non-`SYNC`) watchers.
    fn flush(&self);
}

/// Closure-friendly helpers over any [`Observable`].
pub trait ObservableExt: Observable {
    fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        self.read(&mut |v| {
            if let Some(f) = f.take() {
                out = Some(f(v));
            }
        });
        out.expect("Observable::read must call its closure exactly once")
    }

    fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        self.write(&mut |v| {
            if let Some(f) = f.take() {
                out = Some(f(v));
            }
        });
        out.expect("Observable::write must call its closure exactly once")
    }

    fn snapshot(&self) -> Value {
        self.with(Value::clone)
    }
}

impl<T: Observable + ?Sized> ObservableExt for T {}

struct Watcher {
    id: u64,
    source: WatchSource,
    callback: RefCell<WatchCallback>,
    last: RefCell<Value>,
    options: WatchOptions,
    active: Cell<bool>,
    queued: Cell<bool>,
    running: Cell<bool>,
}

impl Watcher {
    fn run(&self) {
        if !self.active.get() || self.running.get() {
            return;
        }
        // Writes made by the callback must not re-enter this watcher.
        struct Running<'a>(&'a Cell<bool>);
        impl Drop for Running<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }
        self.running.set(true);
        let _running = Running(&self.running);

        let next = (self.source)();
        let changed = self.options.contains(WatchOptions::DEEP) || *self.last.borrow() != next;
        if !changed {
            return;
        }
        let prev = self.last.replace(next.clone());
        let mut callback = self.callback.borrow_mut();
        (*callback)(&next, &prev);
    }
}

type WatcherList = Rc<RefCell<Vec<Rc<Watcher>>>>;

/// The default [`Observable`]: one `RefCell`'d JSON tree plus a version stamp.
pub struct Tree {
    value: RefCell<Value>,
    version: Cell<u64>,
    watchers: WatcherList,
    pending: RefCell<Vec<Rc<Watcher>>>,
    next_watcher: Cell<u64>,
    flushing: Cell<bool>,
}

impl Tree {
    pub fn new(value: Value) -> Self {
        Self {
            value: RefCell::new(value),
            version: Cell::new(0),
            watchers: Rc::new(RefCell::new(Vec::new())),
            pending: RefCell::new(Vec::new()),
            next_watcher: Cell::new(0),
            flushing: Cell::new(false),
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    fn changed(&self) {
        self.version.set(self.version.get().wrapping_add(1));

        // Snapshot first: callbacks may watch or unwatch.
        let watchers: SmallVec<[Rc<Watcher>; 8]> = self.watchers.borrow().iter().cloned().collect();
        for w in watchers {
            if w.options.contains(WatchOptions::SYNC) {
                w.run();
            } else if !w.queued.replace(true) {
                self.pending.borrow_mut().push(w);
            }
        }
    }
}

impl Observable for Tree {
    fn read(&self, f: &mut dyn FnMut(&Value)) {
        f(&self.value.borrow())
    }

    fn write(&self, f: &mut dyn FnMut(&mut Value)) {
        {
            let Ok(mut value) = self.value.try_borrow_mut() else {
                panic!(
                    "[strata] state tree is already borrowed; \
                     it cannot be written from inside a read or another write"
                );
            };
            f(&mut value);
        }
        self.changed();
    }

    fn replace(&self, value: Value) -> Value {
        let prev = self.value.replace(value);
        self.changed();
        prev
    }

    fn touch(&self) {
        self.changed();
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn watch(
        &self,
        source: WatchSource,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Dispose {
        let id = self.next_watcher.get();
        self.next_watcher.set(id + 1);

        let initial = source();
        let watcher = Rc::new(Watcher {
            id,
            source,
            callback: RefCell::new(callback),
            last: RefCell::new(initial),
            options,
            active: Cell::new(true),
            queued: Cell::new(false),
            running: Cell::new(false),
        });
        self.watchers.borrow_mut().push(watcher.clone());

        if options.contains(WatchOptions::IMMEDIATE) {
            let current = watcher.last.borrow().clone();
            let mut callback = watcher.callback.borrow_mut();
            (*callback)(&current, &Value::Null);
        }

        let list: Weak<RefCell<Vec<Rc<Watcher>>>> = Rc::downgrade(&self.watchers);
        Dispose::new(move || {
            watcher.active.set(false);
            if let Some(list) = list.upgrade() {
                list.borrow_mut().retain(|w| w.id != id);
            }
        })
    }

    fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        struct Flushing<'a>(&'a Cell<bool>);
        impl Drop for Flushing<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }
        let _flushing = Flushing(&self.flushing);

        loop {
            let batch = std::mem::take(&mut *self.pending.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for w in batch {
                w.queued.set(false);
                w.run();
            }
        }
    }
}
