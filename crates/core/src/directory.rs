use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use courier_gateway::{DataGateway, UserId, UserRecord};
use serde_json::Value;

use crate::events::{self, UserStatusChanged};
use crate::topics;

type DirectoryCallback = Arc<dyn Fn(&str, &Value) + Send + Sync + 'static>;

struct RegisteredCallback {
    id: u64,
    callback: DirectoryCallback,
}

/// Single source of truth for user identity and online status within a
/// session.
///
/// The cache is append-only plus in-place field updates; it is cleared only by
/// [`UserDirectory::reset`]. An in-flight id set keeps overlapping
/// `load_users` calls from fetching the same id twice.
pub struct UserDirectory {
    gateway: Arc<dyn DataGateway>,
    state: Mutex<DirectoryState>,
    subscribers: Arc<Mutex<Vec<RegisteredCallback>>>,
    next_subscriber: AtomicU64,
}

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, UserRecord>,
    status: HashMap<UserId, bool>,
    in_flight: HashSet<UserId>,
}

impl UserDirectory {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(DirectoryState::default()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber: AtomicU64::new(0),
        }
    }

    /// Fetches every id that is neither cached nor already being fetched, in
    /// one batched gateway call. Failures are logged, never propagated.
    pub async fn load_users(&self, ids: &[UserId]) {
        let missing: Vec<UserId> = {
            let mut state = self.lock_state();
            let missing: Vec<UserId> = ids
                .iter()
                .copied()
                .filter(|id| !state.users.contains_key(id) && !state.in_flight.contains(id))
                .collect();
            state.in_flight.extend(missing.iter().copied());
            missing
        };

        if missing.is_empty() {
            return;
        }

        match self.gateway.get_users_by_ids(&missing).await {
            Ok(users) => {
                let mut state = self.lock_state();
                for user in users {
                    state.status.insert(user.id, user.is_online);
                    state.users.insert(user.id, user);
                }
                for id in &missing {
                    state.in_flight.remove(id);
                }
            }
            Err(error) => {
                tracing::warn!(
                    requested = missing.len(),
                    error = %error,
                    "failed to load users into the directory"
                );
                let mut state = self.lock_state();
                for id in &missing {
                    state.in_flight.remove(id);
                }
            }
        }
    }

    /// Best-effort bulk populate at startup.
    pub async fn preload_all(&self) {
        match self.gateway.get_all_users().await {
            Ok(users) => {
                let mut state = self.lock_state();
                for user in users {
                    state.status.insert(user.id, user.is_online);
                    state.users.insert(user.id, user);
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to preload the user directory");
            }
        }
    }

    pub fn get_user(&self, user_id: UserId) -> Option<UserRecord> {
        self.lock_state().users.get(&user_id).cloned()
    }

    /// Unknown ids read as offline.
    pub fn get_status(&self, user_id: UserId) -> bool {
        self.lock_state().status.get(&user_id).copied().unwrap_or(false)
    }

    pub fn update_status(&self, user_id: UserId, is_online: bool) {
        {
            let mut state = self.lock_state();
            state.status.insert(user_id, is_online);
            if let Some(user) = state.users.get_mut(&user_id) {
                user.is_online = is_online;
                if !is_online {
                    user.last_seen = chrono::Utc::now();
                }
            }
        }

        self.notify(
            topics::USER_STATUS_CHANGED,
            &events::encode(&UserStatusChanged { user_id, is_online }),
        );
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> DirectorySubscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.lock_subscribers().push(RegisteredCallback {
            id,
            callback: Arc::new(callback),
        });
        DirectorySubscription {
            subscribers: Arc::downgrade(&self.subscribers),
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Full clear, used on logout.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.users.clear();
        state.status.clear();
        state.in_flight.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.lock_state().users.len()
    }

    fn notify(&self, event: &str, data: &Value) {
        let snapshot: Vec<DirectoryCallback> = self
            .lock_subscribers()
            .iter()
            .map(|registered| registered.callback.clone())
            .collect();

        for callback in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event, data)));
            if outcome.is_err() {
                tracing::warn!(event, "user directory subscriber panicked");
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<RegisteredCallback>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Disposer for a directory subscription; disposing twice is safe, and
/// dropping the guard disposes as well.
pub struct DirectorySubscription {
    subscribers: Weak<Mutex<Vec<RegisteredCallback>>>,
    id: u64,
    disposed: AtomicBool,
}

impl DirectorySubscription {
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|registered| registered.id != self.id);
        }
    }
}

impl Drop for DirectorySubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_gateway::error::GatewayResult;
    use courier_gateway::{
        ChatGateway, ChatId, ChatSummary, Contact, ContactGateway, Message, MessageGateway,
        MessageId, NewChat, ProfilePatch, UserGateway,
    };
    use std::sync::atomic::AtomicUsize;

    /// Gateway stub that records batch-fetch calls and serves synthetic users.
    struct CountingGateway {
        batch_calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl CountingGateway {
        fn new() -> Self {
            Self {
                batch_calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }

        fn user(id: UserId) -> UserRecord {
            UserRecord {
                id,
                name: format!("user-{id}"),
                username: format!("user_{id}"),
                avatar_url: None,
                bio: None,
                phone: None,
                email: None,
                is_online: true,
                last_seen: chrono::Utc::now(),
            }
        }
    }

    #[async_trait]
    impl UserGateway for CountingGateway {
        async fn get_users_by_ids(&self, ids: &[UserId]) -> GatewayResult<Vec<UserRecord>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(ids.len());
            Ok(ids.iter().map(|id| Self::user(*id)).collect())
        }

        async fn get_all_users(&self) -> GatewayResult<Vec<UserRecord>> {
            Ok(vec![Self::user(UserId::new(1)), Self::user(UserId::new(2))])
        }

        async fn get_user(&self, user_id: UserId) -> GatewayResult<UserRecord> {
            Ok(Self::user(user_id))
        }

        async fn get_current_user(&self) -> GatewayResult<UserRecord> {
            Ok(Self::user(UserId::new(1)))
        }

        async fn update_current_user(&self, _patch: ProfilePatch) -> GatewayResult<UserRecord> {
            Ok(Self::user(UserId::new(1)))
        }

        async fn search_users(&self, _query: &str) -> GatewayResult<Vec<UserRecord>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ChatGateway for CountingGateway {
        async fn get_chats(&self, _offset: usize, _limit: usize) -> GatewayResult<Vec<ChatSummary>> {
            Ok(Vec::new())
        }
        async fn get_chat(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
            Err(courier_gateway::GatewayError::NotFound {
                stage: "stub",
                entity: "chat",
                id: chat_id.to_string(),
            })
        }
        async fn create_chat(&self, _spec: NewChat) -> GatewayResult<ChatSummary> {
            unimplemented!("not exercised")
        }
        async fn delete_chat(&self, _chat_id: ChatId) -> GatewayResult<()> {
            Ok(())
        }
        async fn toggle_chat_pin(&self, _chat_id: ChatId) -> GatewayResult<ChatSummary> {
            unimplemented!("not exercised")
        }
        async fn toggle_chat_mute(&self, _chat_id: ChatId) -> GatewayResult<ChatSummary> {
            unimplemented!("not exercised")
        }
        async fn mark_chat_as_read(&self, _chat_id: ChatId) -> GatewayResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl MessageGateway for CountingGateway {
        async fn get_messages(
            &self,
            _chat_id: ChatId,
            _offset: usize,
            _limit: usize,
        ) -> GatewayResult<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn send_message(&self, _chat_id: ChatId, _text: &str) -> GatewayResult<Message> {
            unimplemented!("not exercised")
        }
        async fn edit_message(&self, _message_id: MessageId, _text: &str) -> GatewayResult<Message> {
            unimplemented!("not exercised")
        }
        async fn delete_message(&self, _message_id: MessageId) -> GatewayResult<()> {
            Ok(())
        }
        async fn mark_message_as_read(&self, _message_id: MessageId) -> GatewayResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ContactGateway for CountingGateway {
        async fn get_contacts(&self) -> GatewayResult<Vec<Contact>> {
            Ok(Vec::new())
        }
        async fn add_contact(&self, _user_id: UserId) -> GatewayResult<bool> {
            Ok(true)
        }
        async fn remove_contact(&self, _user_id: UserId) -> GatewayResult<bool> {
            Ok(true)
        }
        async fn is_contact(&self, _user_id: UserId) -> GatewayResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn load_users_fetches_only_missing_ids() {
        let gateway = Arc::new(CountingGateway::new());
        let directory = UserDirectory::new(gateway.clone());

        directory
            .load_users(&[UserId::new(1), UserId::new(2)])
            .await;
        directory
            .load_users(&[UserId::new(2), UserId::new(3)])
            .await;

        assert_eq!(gateway.batch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*gateway.batch_sizes.lock().unwrap(), vec![2, 1]);
        assert_eq!(directory.cached_len(), 3);
    }

    #[tokio::test]
    async fn fully_cached_request_issues_no_fetch() {
        let gateway = Arc::new(CountingGateway::new());
        let directory = UserDirectory::new(gateway.clone());

        directory.load_users(&[UserId::new(1)]).await;
        directory.load_users(&[UserId::new(1)]).await;

        assert_eq!(gateway.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_updates_notify_subscribers_and_stamp_last_seen() {
        let gateway = Arc::new(CountingGateway::new());
        let directory = UserDirectory::new(gateway);
        directory.load_users(&[UserId::new(2)]).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = seen.clone();
            directory.subscribe(move |event, data| {
                seen.lock().unwrap().push((event.to_string(), data.clone()));
            })
        };

        let before = directory.get_user(UserId::new(2)).unwrap().last_seen;
        directory.update_status(UserId::new(2), false);

        assert!(!directory.get_status(UserId::new(2)));
        let after = directory.get_user(UserId::new(2)).unwrap().last_seen;
        assert!(after >= before);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, topics::USER_STATUS_CHANGED);

        subscription.dispose();
        subscription.dispose(); // idempotent
    }

    #[tokio::test]
    async fn disposed_subscribers_receive_nothing() {
        let gateway = Arc::new(CountingGateway::new());
        let directory = UserDirectory::new(gateway);

        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let calls = calls.clone();
            directory.subscribe(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        subscription.dispose();
        directory.update_status(UserId::new(9), true);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_user_status_defaults_to_offline() {
        let gateway = Arc::new(CountingGateway::new());
        let directory = UserDirectory::new(gateway);
        assert!(!directory.get_status(UserId::new(404)));
    }
}
