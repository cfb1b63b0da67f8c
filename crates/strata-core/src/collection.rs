//! The module tree: registration, lookup, namespaces, and hot updates.

use serde_json::Value;
use slotmap::SlotMap;

use crate::StoreError;
use crate::module::{Module, ModuleId, RawModule};

pub const NAMESPACE_SEPARATOR: char = '/';

pub struct ModuleCollection {
    arena: SlotMap<ModuleId, Module>,
    root: ModuleId,
}

impl ModuleCollection {
    pub fn new(raw_root: RawModule) -> Result<Self, StoreError> {
        validate_tree(&mut Vec::new(), &raw_root)?;
        let mut collection = Self {
            arena: SlotMap::with_key(),
            root: ModuleId::default(),
        };
        collection.root = collection.insert(&mut Vec::new(), raw_root, false)?;
        Ok(collection)
    }

    pub fn root(&self) -> ModuleId {
        self.root
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.arena.get(id)
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.arena.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn get(&self, path: &[String]) -> Option<ModuleId> {
        path.iter()
            .try_fold(self.root, |id, key| self.arena.get(id)?.child(key))
    }

    /// Each namespaced module on the way down contributes `key/`.
    pub fn get_namespace(&self, path: &[String]) -> String {
        let mut id = self.root;
        let mut namespace = String::new();
        for key in path {
            let Some(child) = self.arena.get(id).and_then(|m| m.child(key)) else {
                break;
            };
            id = child;
            if self.arena[id].namespaced() {
                namespace.push_str(key);
                namespace.push(NAMESPACE_SEPARATOR);
            }
        }
        namespace
    }

    /// Registers `raw` (and its declared children) under `path`.
    ///
    /// An existing module at the same path is replaced along with its
    /// subtree.
    pub fn register(
        &mut self,
        path: &[String],
        raw: RawModule,
        runtime: bool,
    ) -> Result<ModuleId, StoreError> {
        let Some((key, parent_path)) = path.split_last() else {
            return Err(StoreError::RootModule);
        };
        let parent = self
            .get(parent_path)
            .ok_or_else(|| StoreError::ParentNotFound(path.join(".")))?;

        validate_key(parent_path, "modules", key)?;
        validate_tree(&mut path.to_vec(), &raw)?;

        let id = self.insert(&mut path.to_vec(), raw, runtime)?;
        let replaced = {
            let children = &mut self.arena[parent].children;
            match children.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => Some(std::mem::replace(&mut entry.1, id)),
                None => {
                    children.push((key.clone(), id));
                    None
                }
            }
        };
        if let Some(old) = replaced {
            self.remove_subtree(old);
        }
        Ok(id)
    }

    /// Detaches a runtime module. Returns whether anything was removed.
    pub fn unregister(&mut self, path: &[String]) -> bool {
        let Some((key, parent_path)) = path.split_last() else {
            log::warn!("[strata] the root module cannot be unregistered");
            return false;
        };
        let Some(parent) = self.get(parent_path) else {
            log::warn!("[strata] trying to unregister module '{key}', which is not registered");
            return false;
        };
        let Some(child) = self.arena[parent].child(key) else {
            log::warn!("[strata] trying to unregister module '{key}', which is not registered");
            return false;
        };
        if !self.arena[child].runtime {
            log::debug!("[strata] module '{}' was declared statically; keeping it", path.join("."));
            return false;
        }

        self.arena[parent].children.retain(|(k, _)| k != key);
        self.remove_subtree(child);
        true
    }

    pub fn is_registered(&self, path: &[String]) -> bool {
        let Some((key, parent_path)) = path.split_last() else {
            return false;
        };
        self.get(parent_path)
            .and_then(|parent| self.arena.get(parent))
            .is_some_and(|parent| parent.has_child(key))
    }

    /// Hot-reload the handlers of every existing module from `raw_root`.
    ///
    /// New modules cannot be introduced this way: the walk stops at the first
    /// unknown child of a level and logs a warning.
    pub fn update(&mut self, raw_root: &RawModule) -> Result<(), StoreError> {
        validate_tree(&mut Vec::new(), raw_root)?;
        let mut path = Vec::new();
        self.update_module(&mut path, self.root, raw_root);
        Ok(())
    }

    fn update_module(&mut self, path: &mut Vec<String>, id: ModuleId, raw: &RawModule) {
        let Some(module) = self.arena.get_mut(id) else {
            return;
        };
        module.update(raw);

        for (key, child_raw) in &raw.modules {
            let Some(child) = self.arena[id].child(key) else {
                log::warn!(
                    "[strata] trying to add a new module '{key}' on hot reloading, \
                     manual reload is needed"
                );
                return;
            };
            path.push(key.clone());
            self.update_module(path, child, child_raw);
            path.pop();
        }
    }

    fn insert(
        &mut self,
        path: &mut Vec<String>,
        mut raw: RawModule,
        runtime: bool,
    ) -> Result<ModuleId, StoreError> {
        let children = std::mem::take(&mut raw.modules);
        let module = Module::new(raw, runtime);
        // Children are grafted into this module's state object.
        if !children.is_empty() && !module.state.is_object() {
            return Err(StoreError::InvalidModule {
                path: path.join("."),
                key: "state".into(),
                expected: "an object when the module declares child modules",
                found: describe(&module.state),
            });
        }

        let id = self.arena.insert(module);
        for (key, child_raw) in &children {
            path.push(key.clone());
            let child = self.insert(path, child_raw.clone(), runtime);
            path.pop();
            match child {
                Ok(child) => self.arena[id].children.push((key.clone(), child)),
                Err(err) => {
                    self.remove_subtree(id);
                    return Err(err);
                }
            }
        }
        // Keep the declared children on the definition for later hot updates.
        self.arena[id].raw.modules = children;
        Ok(id)
    }

    fn remove_subtree(&mut self, id: ModuleId) {
        if let Some(module) = self.arena.remove(id) {
            for (_, child) in module.children {
                self.remove_subtree(child);
            }
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "a boolean".into(),
        Value::Number(n) => format!("the number {n}"),
        Value::String(s) => format!("the string {s:?}"),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}

fn validate_key(path: &[String], kind: &str, key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty() || (kind == "modules" && key.contains(NAMESPACE_SEPARATOR));
    if invalid {
        return Err(StoreError::InvalidModule {
            path: path.join("."),
            key: format!("{kind}.{key:?}"),
            expected: "a non-empty key without '/'",
            found: format!("{key:?}"),
        });
    }
    Ok(())
}

/// Key checks the type system cannot express. State shape is checked once
/// the state has been materialized.
fn validate_tree(path: &mut Vec<String>, raw: &RawModule) -> Result<(), StoreError> {
    for (key, _) in &raw.mutations {
        validate_key(path, "mutations", key)?;
    }
    for (key, _) in &raw.actions {
        validate_key(path, "actions", key)?;
    }
    for (key, _) in &raw.getters {
        validate_key(path, "getters", key)?;
    }

    for (key, child) in &raw.modules {
        validate_key(path, "modules", key)?;
        path.push(key.clone());
        validate_tree(path, child)?;
        path.pop();
    }
    Ok(())
}
