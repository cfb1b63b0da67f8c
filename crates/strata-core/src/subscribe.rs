use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use smallvec::SmallVec;
use strata_reactive::Dispose;

use crate::context::{ActionRecord, MutationRecord};

pub type MutationSubscriber = Rc<dyn Fn(&MutationRecord, &Value)>;
pub type ActionHook = Rc<dyn Fn(&ActionRecord, &Value)>;
pub type ActionErrorHook = Rc<dyn Fn(&ActionRecord, &Value, &anyhow::Error)>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Notify this subscriber before every existing one.
    pub prepend: bool,
}

impl SubscribeOptions {
    pub fn prepend() -> Self {
        Self { prepend: true }
    }
}

/// Hooks around a dispatch. A bare closure converts into a `before` hook.
#[derive(Clone, Default)]
pub struct ActionSubscriber {
    pub before: Option<ActionHook>,
    pub after: Option<ActionHook>,
    pub error: Option<ActionErrorHook>,
}

impl ActionSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, f: impl Fn(&ActionRecord, &Value) + 'static) -> Self {
        self.before = Some(Rc::new(f));
        self
    }

    pub fn after(mut self, f: impl Fn(&ActionRecord, &Value) + 'static) -> Self {
        self.after = Some(Rc::new(f));
        self
    }

    pub fn error(mut self, f: impl Fn(&ActionRecord, &Value, &anyhow::Error) + 'static) -> Self {
        self.error = Some(Rc::new(f));
        self
    }
}

impl<F> From<F> for ActionSubscriber
where
    F: Fn(&ActionRecord, &Value) + 'static,
{
    fn from(f: F) -> Self {
        ActionSubscriber::new().before(f)
    }
}

/// An ordered subscriber list. Entries are compared by allocation, so
/// subscribing the same `Rc` twice keeps a single entry.
pub(crate) struct Subscribers<T: ?Sized>(Rc<RefCell<Vec<Rc<T>>>>);

impl<T: ?Sized + 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn add(&self, entry: Rc<T>, options: SubscribeOptions) -> Dispose {
        {
            let mut list = self.0.borrow_mut();
            if !list.iter().any(|e| same(e, &entry)) {
                if options.prepend {
                    list.insert(0, entry.clone());
                } else {
                    list.push(entry.clone());
                }
            }
        }
        let list = Rc::downgrade(&self.0);
        Dispose::new(move || {
            if let Some(list) = list.upgrade() {
                let mut list = list.borrow_mut();
                if let Some(i) = list.iter().position(|e| same(e, &entry)) {
                    list.remove(i);
                }
            }
        })
    }

    /// Copy of the current list, so callbacks may (un)subscribe freely.
    pub fn snapshot(&self) -> SmallVec<[Rc<T>; 4]> {
        self.0.borrow().iter().cloned().collect()
    }
}

fn same<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
