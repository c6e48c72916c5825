//! Who is signed in, and which profile that makes them.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use mirror::{
    ListenerKey, Listeners,
    auth::{AuthProvider, AuthUser},
    listeners::notify_all,
    remote::Subscription,
};

use crate::{
    config::ProfileBindings,
    profile::{CELIA_ID, PABLO_ID},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub uid: Option<String>,
    pub email: Option<String>,
    /// The fixed profile bound to the signed-in identity, if it is bound at all.
    pub own_profile_id: Option<String>,
    /// True until the auth provider has reported for the first time.
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            uid: None,
            email: None,
            own_profile_id: None,
            loading: true,
        }
    }
}

struct SessionShared {
    bindings: ProfileBindings,
    state: RefCell<SessionState>,
    listeners: RefCell<Listeners>,
    auth_subscription: RefCell<Option<Subscription>>,
}

#[derive(Clone)]
pub struct Session {
    shared: Rc<SessionShared>,
}

impl Session {
    pub fn new(bindings: ProfileBindings) -> Self {
        Self {
            shared: Rc::new(SessionShared {
                bindings,
                state: RefCell::new(SessionState::default()),
                listeners: RefCell::new(Listeners::new()),
                auth_subscription: RefCell::new(None),
            }),
        }
    }

    /// Follow `auth` from now on. Calling it again replaces the previous provider.
    pub fn start(&self, auth: &dyn AuthProvider) {
        let weak: Weak<SessionShared> = Rc::downgrade(&self.shared);
        let subscription = auth.on_auth_state_changed(Box::new(move |user| {
            if let Some(shared) = weak.upgrade() {
                Session { shared }.on_identity_changed(user);
            }
        }));
        // the previous subscription (if any) is dropped, and with it the old registration
        let previous = self.shared.auth_subscription.replace(Some(subscription));
        drop(previous);
    }

    pub fn on_identity_changed(&self, user: Option<&AuthUser>) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.loading = false;
            match user {
                None => {
                    state.uid = None;
                    state.email = None;
                    state.own_profile_id = None;
                }
                Some(user) => {
                    state.uid = Some(user.uid.clone());
                    state.email = user.email.clone();
                    state.own_profile_id =
                        self.shared.bindings.profile_for(&user.uid).map(str::to_string);
                    if state.own_profile_id.is_none() {
                        log::info!("Signed in as {} without a bound profile", user.uid);
                    }
                }
            }
        }
        let listeners = self.shared.listeners.borrow().pending_calls();
        notify_all(listeners);
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    pub fn own_profile_id(&self) -> Option<String> {
        self.shared.state.borrow().own_profile_id.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.shared.state.borrow().uid.is_some()
    }

    /// Name to greet the signed-in person with.
    pub fn display_name(&self) -> String {
        let state = self.shared.state.borrow();
        match state.own_profile_id.as_deref() {
            Some(PABLO_ID) => "Pablo".to_string(),
            Some(CELIA_ID) => "Celia".to_string(),
            _ => state.email.clone().unwrap_or_else(|| "—".to_string()),
        }
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.shared.listeners.borrow_mut().insert(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.shared.listeners.borrow_mut().remove(key);
    }
}
