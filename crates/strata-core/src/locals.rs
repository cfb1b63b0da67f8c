//! # Providing a store
//!
//! Code deep inside an application rarely wants a `Store` threaded through
//! every call. `provide_store` makes a store current for the duration of a
//! closure; anything running inside it reaches the store with `use_store`.
//! Frames nest, and the innermost one wins:
//!
//! ```rust
//! use strata_core::*;
//!
//! let store = Store::new(StoreOptions::default()).unwrap();
//! assert!(use_store().is_none());
//!
//! provide_store(store.clone(), || {
//!     let current = use_store().unwrap();
//!     assert!(current.ptr_eq(&store));
//! });
//! ```

use std::cell::RefCell;

use crate::store::Store;

thread_local! {
    static STORE_STACK: RefCell<Vec<Store>> = const { RefCell::new(Vec::new()) };
}

pub fn provide_store<R>(store: Store, f: impl FnOnce() -> R) -> R {
    // Pops on unwind too.
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            STORE_STACK.with(|st| {
                st.borrow_mut().pop();
            });
        }
    }
    STORE_STACK.with(|st| st.borrow_mut().push(store));
    let _guard = Guard;
    f()
}

/// The store of the innermost enclosing `provide_store`, if any.
pub fn use_store() -> Option<Store> {
    STORE_STACK.with(|st| st.borrow().last().cloned())
}
