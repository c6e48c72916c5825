//! Authenticated identity, as far as mirroring cares: either somebody is signed in or nobody is.

use std::{cell::RefCell, rc::Rc};

use slotmap::SlotMap;

use crate::remote::Subscription;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}

pub type AuthCallback = Box<dyn FnMut(Option<&AuthUser>)>;

pub trait AuthProvider {
    fn current_user(&self) -> Option<AuthUser>;

    /// Register for identity changes. The callback fires once with the current state, then on every change.
    fn on_auth_state_changed(&self, callback: AuthCallback) -> Subscription;
}

slotmap::new_key_type! { struct AuthListenerKey; }

#[derive(Default)]
struct ManualAuthState {
    user: Option<AuthUser>,
    listeners: SlotMap<AuthListenerKey, Rc<RefCell<AuthCallback>>>,
}

/// An auth provider driven by hand: hosts without a real identity service, and tests.
#[derive(Clone, Default)]
pub struct ManualAuth {
    state: Rc<RefCell<ManualAuthState>>,
}

impl ManualAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: AuthUser) -> Self {
        let auth = Self::new();
        auth.state.borrow_mut().user = Some(user);
        auth
    }

    pub fn sign_in(&self, user: AuthUser) {
        self.state.borrow_mut().user = Some(user);
        self.notify();
    }

    pub fn sign_out(&self) {
        self.state.borrow_mut().user = None;
        self.notify();
    }

    fn notify(&self) {
        // collect first: listeners are free to read the provider or unsubscribe while being called
        let (user, listeners) = {
            let state = self.state.borrow();
            let listeners = state.listeners.values().cloned().collect::<Vec<_>>();
            (state.user.clone(), listeners)
        };
        for listener in listeners {
            (listener.borrow_mut())(user.as_ref());
        }
    }
}

impl AuthProvider for ManualAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().user.clone()
    }

    fn on_auth_state_changed(&self, callback: AuthCallback) -> Subscription {
        let callback = Rc::new(RefCell::new(callback));
        let key = self
            .state
            .borrow_mut()
            .listeners
            .insert(Rc::clone(&callback));

        let user = self.current_user();
        (callback.borrow_mut())(user.as_ref());

        let state = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().listeners.remove(key);
            }
        })
    }
}
