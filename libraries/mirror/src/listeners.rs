//! Change listeners. Registered callbacks take no arguments: they are expected to read whatever they need back
//! from the store that notified them, which is why they are only ever called with no borrow held.

use std::rc::Rc;

use slotmap::SlotMap;

slotmap::new_key_type! { pub struct ListenerKey; }

#[derive(Default)]
pub struct Listeners {
    listeners: SlotMap<ListenerKey, Rc<dyn Fn()>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, listener: impl Fn() + 'static) -> ListenerKey {
        self.listeners.insert(Rc::new(listener))
    }

    pub fn remove(&mut self, key: ListenerKey) {
        self.listeners.remove(key);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// The callbacks to run for one notification. Call them after releasing whatever borrow produced this list.
    pub fn pending_calls(&self) -> Vec<Rc<dyn Fn()>> {
        self.listeners.values().cloned().collect()
    }
}

pub fn notify_all(calls: Vec<Rc<dyn Fn()>>) {
    for call in calls {
        call();
    }
}
