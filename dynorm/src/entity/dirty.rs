use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Dirty marker shared between an entity and the children attached to it.
///
/// A child holds weak links to its parents' flags; marking the child marks every reachable
/// ancestor before returning.
#[derive(Debug, Default)]
pub(crate) struct DirtyFlag {
    dirty: AtomicBool,
    parents: Mutex<Vec<Weak<DirtyFlag>>>,
}

impl DirtyFlag {
    pub fn new(dirty: bool) -> Arc<Self> {
        Arc::new(DirtyFlag { dirty: AtomicBool::new(dirty), parents: Mutex::new(Vec::new()) })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn mark(&self) {
        self.mark_from(&mut Vec::new());
    }

    fn mark_from(&self, visited: &mut Vec<*const DirtyFlag>) {
        let this = self as *const DirtyFlag;
        if visited.contains(&this) {
            return;
        }
        visited.push(this);
        self.dirty.store(true, Ordering::SeqCst);
        let parents: Vec<Arc<DirtyFlag>> = self.links().iter().filter_map(Weak::upgrade).collect();
        for parent in parents {
            parent.mark_from(visited);
        }
    }

    pub fn attach(&self, parent: &Arc<DirtyFlag>) {
        let parent = Arc::downgrade(parent);
        let mut links = self.links();
        links.retain(|link| link.strong_count() > 0);
        if !links.iter().any(|link| link.ptr_eq(&parent)) {
            links.push(parent);
        }
    }

    pub fn detach(&self, parent: &Arc<DirtyFlag>) {
        let parent = Arc::downgrade(parent);
        self.links().retain(|link| !link.ptr_eq(&parent) && link.strong_count() > 0);
    }

    fn links(&self) -> MutexGuard<'_, Vec<Weak<DirtyFlag>>> {
        self.parents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
