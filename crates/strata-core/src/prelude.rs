pub use crate::context::{
    ActionContext, ActionRecord, CallType, CommitOptions, DispatchOptions, LocalContext,
    LocalGetters, MutationRecord,
};
pub use crate::error::StoreError;
pub use crate::helpers::{Helpers, names, namespaced_helpers};
pub use crate::locals::{provide_store, use_store};
pub use crate::module::{ActionFuture, RawModule};
pub use crate::store::{Getters, ModuleOptions, Store, StoreOptions, WeakStore};
pub use crate::subscribe::{ActionSubscriber, SubscribeOptions};
pub use strata_reactive::{Dispose, WatchOptions};
