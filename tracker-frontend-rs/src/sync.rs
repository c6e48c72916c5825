//! Keeps live bindings connected exactly while somebody is signed in.

use std::rc::Rc;

use mirror::{LiveBinding, auth::AuthProvider, remote::Subscription};

/// Connects every binding on sign-in and disconnects them on sign-out. Every signed-in notification reconnects
/// bindings that dropped their live query, e.g. after a permission error raced a token refresh. Dropping the driver
/// stops it, but leaves the bindings in whatever state they are in.
pub struct SyncDriver {
    _auth_subscription: Subscription,
}

impl SyncDriver {
    pub fn start(auth: &dyn AuthProvider, bindings: Vec<Rc<dyn LiveBinding>>) -> Self {
        let mut current_uid: Option<String> = None;
        let subscription = auth.on_auth_state_changed(Box::new(move |user| {
            let uid = user.map(|user| user.uid.clone());
            if uid != current_uid {
                // a different identity may see different data, so start from scratch
                for binding in &bindings {
                    binding.disconnect();
                }
                match &uid {
                    Some(_) => log::info!("Signed in, connecting {} live bindings", bindings.len()),
                    None => log::info!("Signed out, live bindings disconnected"),
                }
            }
            // connecting a connected binding is a no-op
            if uid.is_some() {
                for binding in &bindings {
                    binding.connect();
                }
            }
            current_uid = uid;
        }));
        Self {
            _auth_subscription: subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::Harness, tracked::TrackedItems};
    use mirror::{ConnectionState, auth::AuthUser};

    #[test]
    fn test_connects_while_signed_in() {
        let harness = Harness::new();
        harness.auth.sign_out();
        let tracked = TrackedItems::new(harness.services());
        let store: Rc<dyn LiveBinding> = Rc::new(tracked.store().clone());

        let driver = SyncDriver::start(&harness.auth, vec![Rc::clone(&store)]);
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);

        harness.auth.sign_in(AuthUser::new("uid-1", None));
        assert_eq!(store.connection_state(), ConnectionState::Connected);
        assert_eq!(harness.remote.active_subscriptions(), 1);

        harness.auth.sign_in(AuthUser::new("uid-2", None));
        assert_eq!(harness.remote.active_subscriptions(), 1, "reconnected, not doubled");

        harness.auth.sign_out();
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);
        assert_eq!(harness.remote.active_subscriptions(), 0);

        drop(driver);
        harness.auth.sign_in(AuthUser::new("uid-1", None));
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_same_user_notification_reconnects_after_denial() {
        let mut harness = Harness::new();
        harness.auth.sign_out();
        let tracked = TrackedItems::new(harness.services());
        let store: Rc<dyn LiveBinding> = Rc::new(tracked.store().clone());
        let _driver = SyncDriver::start(&harness.auth, vec![Rc::clone(&store)]);

        let collection = tracked.store().spec().collection.clone();
        harness.remote.deny_reads(&collection);
        harness.auth.sign_in(AuthUser::new("uid-1", None));
        harness.settle();
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);
        assert_eq!(harness.remote.active_subscriptions(), 0);

        // token refreshed, same user
        harness.remote.allow_reads(&collection);
        harness.auth.sign_in(AuthUser::new("uid-1", None));
        harness.settle();
        assert_eq!(store.connection_state(), ConnectionState::Connected);
        assert_eq!(harness.remote.active_subscriptions(), 1);

        harness.auth.sign_in(AuthUser::new("uid-1", None));
        assert_eq!(harness.remote.active_subscriptions(), 1, "a live query is kept, not reopened");
    }

    #[test]
    fn test_already_signed_in_connects_on_start() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let store: Rc<dyn LiveBinding> = Rc::new(tracked.store().clone());
        let _driver = SyncDriver::start(&harness.auth, vec![store]);
        assert_eq!(tracked.store().connection_state(), ConnectionState::Connected);
    }
}
