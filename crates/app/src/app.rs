use std::collections::HashSet;
use std::sync::Arc;

use courier_core::component::ComponentRegistry;
use courier_core::events::{
    self, ChatDeleted, ChatSelected, OpenChatWithUser, RouteRequested, TargetPanel,
    UserProfileRequested, WsUserStatus,
};
use courier_core::{ComponentKind, EventBus, PanelController, UserDirectory, topics};
use courier_gateway::{DataGateway, UserId};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::components::chat::{ChatPanelData, DraftChat};
use crate::components::{ChatView, ChatsList, Profile, ProfileEditor, Search, SubscriptionBag};

const CHAT_SCAN_LIMIT: usize = 200;
pub const EMPTY_STATE_TITLE: &str = "Select a chat";
pub const EMPTY_STATE_HINT: &str = "Choose a chat from the list to start messaging";

/// Builds the factory table for all five panel components.
pub fn build_registry(
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    directory: Arc<UserDirectory>,
    local_user_id: UserId,
) -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();

    {
        let bus = bus.clone();
        let gateway = gateway.clone();
        let directory = directory.clone();
        registry.register(ComponentKind::ChatsList, move || {
            Box::new(ChatsList::new(bus.clone(), gateway.clone(), directory.clone()))
        });
    }
    {
        let bus = bus.clone();
        let gateway = gateway.clone();
        registry.register(ComponentKind::Chat, move || {
            Box::new(ChatView::new(bus.clone(), gateway.clone(), local_user_id))
        });
    }
    {
        let bus = bus.clone();
        let gateway = gateway.clone();
        let directory = directory.clone();
        registry.register(ComponentKind::Profile, move || {
            Box::new(Profile::new(
                bus.clone(),
                gateway.clone(),
                directory.clone(),
                local_user_id,
            ))
        });
    }
    {
        let bus = bus.clone();
        let gateway = gateway.clone();
        registry.register(ComponentKind::ProfileEditor, move || {
            Box::new(ProfileEditor::new(bus.clone(), gateway.clone()))
        });
    }
    {
        let bus = bus.clone();
        let gateway = gateway.clone();
        registry.register(ComponentKind::Search, move || {
            Box::new(Search::new(bus.clone(), gateway.clone()))
        });
    }

    registry
}

/// Component kinds whose visits never enter back-history.
pub fn transient_components() -> HashSet<ComponentKind> {
    HashSet::from([ComponentKind::Search, ComponentKind::ProfileEditor])
}

enum AppAction {
    LoadPrimary(ComponentKind, Option<Value>),
    LoadSecondary(ComponentKind, Option<Value>),
    GoBack,
    RefreshPrimary,
    RefreshPrimaryIf(ComponentKind),
    OpenChatWithUser(OpenChatWithUser),
    ChatDeleted(ChatDeleted),
}

/// Top-level orchestrator: a fixed table of topic→action bindings feeding a
/// single action queue, so navigation on each region is processed strictly
/// one request at a time.
pub struct AppShell {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    directory: Arc<UserDirectory>,
    primary: PanelController,
    secondary: PanelController,
    actions: mpsc::UnboundedReceiver<AppAction>,
    _bindings: SubscriptionBag,
}

impl AppShell {
    pub fn new(
        bus: EventBus,
        gateway: Arc<dyn DataGateway>,
        directory: Arc<UserDirectory>,
        primary: PanelController,
        secondary: PanelController,
    ) -> Self {
        let (sender, actions) = mpsc::unbounded_channel();
        let bindings = Self::bind_topics(&bus, &directory, sender);

        Self {
            bus,
            gateway,
            directory,
            primary,
            secondary,
            actions,
            _bindings: bindings,
        }
    }

    fn bind_topics(
        bus: &EventBus,
        directory: &Arc<UserDirectory>,
        sender: mpsc::UnboundedSender<AppAction>,
    ) -> SubscriptionBag {
        let mut bag = SubscriptionBag::new(bus.clone());

        let enqueue = |sender: &mpsc::UnboundedSender<AppAction>, action: AppAction| {
            if sender.send(action).is_err() {
                tracing::warn!("app shell action queue is gone");
            }
        };

        {
            let sender = sender.clone();
            bag.add(
                topics::CHAT_SELECTED,
                bus.on(topics::CHAT_SELECTED, move |payload| {
                    enqueue(
                        &sender,
                        AppAction::LoadSecondary(ComponentKind::Chat, Some(payload.clone())),
                    );
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::USER_PROFILE_REQUESTED,
                bus.on(topics::USER_PROFILE_REQUESTED, move |payload| {
                    enqueue(
                        &sender,
                        AppAction::LoadPrimary(ComponentKind::Profile, Some(payload.clone())),
                    );
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::PROFILE_REQUESTED,
                bus.on(topics::PROFILE_REQUESTED, move |_payload| {
                    enqueue(&sender, AppAction::LoadPrimary(ComponentKind::Profile, None));
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::NAVIGATE_BACK,
                bus.on(topics::NAVIGATE_BACK, move |_payload| {
                    enqueue(&sender, AppAction::GoBack);
                }),
            );
        }
        {
            // The data-route/data-panel navigation surface.
            let sender = sender.clone();
            bag.add(
                topics::ROUTE_REQUESTED,
                bus.on(topics::ROUTE_REQUESTED, move |payload| {
                    let Some(request) = events::decode::<RouteRequested>(payload) else {
                        return;
                    };
                    let action = match request.panel {
                        TargetPanel::Primary => AppAction::LoadPrimary(request.route, None),
                        TargetPanel::Secondary => AppAction::LoadSecondary(request.route, None),
                    };
                    enqueue(&sender, action);
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::OPEN_CHAT_WITH_USER,
                bus.on(topics::OPEN_CHAT_WITH_USER, move |payload| {
                    if let Some(request) = events::decode::<OpenChatWithUser>(payload) {
                        enqueue(&sender, AppAction::OpenChatWithUser(request));
                    }
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::PROFILE_UPDATED,
                bus.on(topics::PROFILE_UPDATED, move |_payload| {
                    enqueue(&sender, AppAction::RefreshPrimary);
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::CONTACTS_UPDATED,
                bus.on(topics::CONTACTS_UPDATED, move |_payload| {
                    enqueue(
                        &sender,
                        AppAction::RefreshPrimaryIf(ComponentKind::Profile),
                    );
                }),
            );
        }
        {
            let sender = sender.clone();
            bag.add(
                topics::CHAT_DELETED,
                bus.on(topics::CHAT_DELETED, move |payload| {
                    if let Some(event) = events::decode::<ChatDeleted>(payload) {
                        enqueue(&sender, AppAction::ChatDeleted(event));
                    }
                }),
            );
        }
        {
            // Status flips patch the directory synchronously; no navigation.
            let directory = directory.clone();
            bag.add(
                topics::WEBSOCKET_USER_STATUS,
                bus.on(topics::WEBSOCKET_USER_STATUS, move |payload| {
                    if let Some(event) = events::decode::<WsUserStatus>(payload) {
                        directory.update_status(event.user_id, event.is_online);
                    }
                }),
            );
        }

        bag
    }

    /// Startup sequence: warm the directory, show the chat list, leave the
    /// secondary region in its empty state.
    pub async fn bootstrap(&mut self) {
        self.directory.preload_all().await;
        if let Err(error) = self.primary.load(ComponentKind::ChatsList, None).await {
            tracing::error!(error = %error, "failed to load the initial chat list");
        }
        self.secondary.show_empty_state(EMPTY_STATE_TITLE, EMPTY_STATE_HINT);
    }

    /// Processes actions until the queue closes (it stays open for the
    /// lifetime of the bus bindings, so this effectively runs forever).
    pub async fn run(&mut self) {
        while let Some(action) = self.actions.recv().await {
            self.handle(action).await;
        }
    }

    /// Drains everything currently queued; the test harness's event pump.
    pub async fn process_pending(&mut self) {
        while let Ok(action) = self.actions.try_recv() {
            self.handle(action).await;
        }
    }

    pub fn primary(&self) -> &PanelController {
        &self.primary
    }

    pub fn secondary(&self) -> &PanelController {
        &self.secondary
    }

    async fn handle(&mut self, action: AppAction) {
        match action {
            AppAction::LoadPrimary(kind, data) => {
                // A failed load already rendered its error surface.
                let _ = self.primary.load(kind, data).await;
            }
            AppAction::LoadSecondary(kind, data) => {
                let _ = self.secondary.load(kind, data).await;
            }
            AppAction::GoBack => {
                let _ = self.primary.go_back().await;
            }
            AppAction::RefreshPrimary => {
                self.primary.refresh_current().await;
            }
            AppAction::RefreshPrimaryIf(kind) => {
                if self.primary.current_kind() == Some(kind) {
                    self.primary.refresh_current().await;
                }
            }
            AppAction::OpenChatWithUser(request) => {
                self.open_chat_with_user(request).await;
            }
            AppAction::ChatDeleted(event) => {
                self.close_secondary_if_showing(event.chat_id).await;
            }
        }
    }

    /// Finds the existing private chat with the user, or opens a draft
    /// conversation that becomes a real chat on first send.
    async fn open_chat_with_user(&mut self, request: OpenChatWithUser) {
        match self.gateway.get_chats(0, CHAT_SCAN_LIMIT).await {
            Ok(chats) => {
                if let Some(chat) = chats.into_iter().find(|chat| chat.peer_id == request.user_id) {
                    // Through the bus, so active-chat tracking sees it too.
                    self.bus
                        .emit(topics::CHAT_SELECTED, events::encode(&ChatSelected { chat }));
                } else {
                    let data = events::encode(&ChatPanelData {
                        chat: None,
                        draft: Some(DraftChat {
                            user_id: request.user_id,
                            name: request.user_name,
                            avatar_url: request.user_avatar,
                        }),
                    });
                    let _ = self.secondary.load(ComponentKind::Chat, Some(data)).await;
                }
            }
            Err(error) => {
                tracing::warn!(user_id = %request.user_id, error = %error, "failed to open chat with user");
            }
        }
    }

    async fn close_secondary_if_showing(&mut self, chat_id: courier_gateway::ChatId) {
        let showing_deleted_chat = self
            .secondary
            .current_data()
            .and_then(|data| events::decode::<ChatPanelData>(data))
            .and_then(|data| data.chat)
            .is_some_and(|chat| chat.id == chat_id);

        if showing_deleted_chat {
            self.secondary.show_empty_state(EMPTY_STATE_TITLE, EMPTY_STATE_HINT);
        }
    }

    /// Navigation entry point used by frontends driving the shell directly.
    pub fn request_profile(&self, user_id: Option<UserId>) {
        match user_id {
            Some(user_id) => self.bus.emit(
                topics::USER_PROFILE_REQUESTED,
                events::encode(&UserProfileRequested { user_id }),
            ),
            None => self.bus.emit(topics::PROFILE_REQUESTED, Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MessageRouter;
    use crate::surface::InMemoryRegion;
    use crate::templates::StaticTemplates;
    use chrono::Utc;
    use courier_core::events::WsNewMessage;
    use courier_gateway::{ChatId, Message, MessageId, MessageKind, MockGateway};

    struct Harness {
        bus: EventBus,
        shell: AppShell,
        primary_region: Arc<InMemoryRegion>,
        secondary_region: Arc<InMemoryRegion>,
        _router: MessageRouter,
    }

    async fn harness() -> Harness {
        let bus = EventBus::new();
        let gateway: Arc<dyn DataGateway> = Arc::new(MockGateway::new());
        let directory = Arc::new(UserDirectory::new(gateway.clone()));
        let local_user_id = UserId::new(1);

        let registry = Arc::new(build_registry(
            bus.clone(),
            gateway.clone(),
            directory.clone(),
            local_user_id,
        ));
        let templates = Arc::new(StaticTemplates::new());
        let primary_region = Arc::new(InMemoryRegion::new("primary"));
        let secondary_region = Arc::new(InMemoryRegion::new("secondary"));

        let primary = PanelController::with_history(
            "primary",
            primary_region.clone(),
            templates.clone(),
            registry.clone(),
            ComponentKind::ChatsList,
            transient_components(),
        );
        let secondary = PanelController::without_history(
            "secondary",
            secondary_region.clone(),
            templates,
            registry,
        );

        let router = MessageRouter::install(bus.clone(), gateway.clone(), local_user_id);
        let mut shell = AppShell::new(bus.clone(), gateway, directory, primary, secondary);
        shell.bootstrap().await;

        Harness {
            bus,
            shell,
            primary_region,
            secondary_region,
            _router: router,
        }
    }

    fn select_seeded_chat(bus: &EventBus) {
        let chat = courier_gateway::ChatSummary {
            id: ChatId::new(1),
            peer_id: UserId::new(2),
            kind: courier_gateway::ChatKind::Private,
            name: "Anna Smirnova".to_string(),
            avatar_url: None,
            last_message: None,
            unread_count: 0,
            is_pinned: false,
            is_muted: false,
        };
        bus.emit(topics::CHAT_SELECTED, events::encode(&ChatSelected { chat }));
    }

    fn wire_message(chat_id: i64, sender: i64, id: i64, text: &str) -> Value {
        events::encode(&WsNewMessage {
            chat_id: ChatId::new(chat_id),
            message: Message {
                id: MessageId::new(id),
                chat_id: ChatId::new(chat_id),
                sender_id: UserId::new(sender),
                sender_name: None,
                text: text.to_string(),
                sent_at: Utc::now(),
                kind: MessageKind::Text,
                is_read: false,
                is_edited: false,
                edited_at: None,
            },
        })
    }

    #[tokio::test]
    async fn bootstrap_shows_the_chat_list_and_an_empty_secondary() {
        let harness = harness().await;

        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::ChatsList)
        );
        let rows = harness.primary_region.slot("chats").unwrap();
        assert!(rows.contains("Anna Smirnova"));
        assert!(rows.contains("Maxim Petrov"));
        assert!(harness.secondary_region.markup().contains(EMPTY_STATE_TITLE));
    }

    #[tokio::test]
    async fn selecting_a_chat_loads_it_into_the_secondary_region() {
        let mut harness = harness().await;

        select_seeded_chat(&harness.bus);
        harness.shell.process_pending().await;

        assert_eq!(
            harness.shell.secondary().current_kind(),
            Some(ComponentKind::Chat)
        );
        let header = harness.secondary_region.slot("header").unwrap();
        assert!(header.contains("Anna Smirnova"));
        let thread = harness.secondary_region.slot("messages").unwrap();
        assert!(thread.contains("Going well, thanks!"));
    }

    #[tokio::test]
    async fn inbound_message_fast_paths_both_regions() {
        let mut harness = harness().await;
        select_seeded_chat(&harness.bus);
        harness.shell.process_pending().await;

        let installs_before = harness.secondary_region.install_count();

        harness.bus.emit(
            topics::WEBSOCKET_NEW_MESSAGE,
            wire_message(1, 2, 900, "fresh over the wire"),
        );
        harness.shell.process_pending().await;

        // Active chat patched in place.
        let thread = harness.secondary_region.slot("messages").unwrap();
        assert!(thread.contains("fresh over the wire"));
        // List row patched in place.
        let rows = harness.primary_region.slot("chats").unwrap();
        assert!(rows.contains("fresh over the wire"));
        // No full reload of either region happened.
        assert_eq!(harness.secondary_region.install_count(), installs_before);
    }

    #[tokio::test]
    async fn self_echo_is_not_applied_twice() {
        let mut harness = harness().await;
        select_seeded_chat(&harness.bus);
        harness.shell.process_pending().await;

        let thread_before = harness.secondary_region.slot("messages").unwrap();
        harness.bus.emit(
            topics::WEBSOCKET_NEW_MESSAGE,
            wire_message(1, 1, 901, "my own echo"),
        );
        harness.shell.process_pending().await;

        let thread_after = harness.secondary_region.slot("messages").unwrap();
        assert_eq!(thread_before, thread_after);
        assert!(!thread_after.contains("my own echo"));
    }

    #[tokio::test]
    async fn profile_navigation_and_back_round_trip() {
        let mut harness = harness().await;

        harness.shell.request_profile(Some(UserId::new(2)));
        harness.shell.process_pending().await;
        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::Profile)
        );
        let card = harness.primary_region.slot("card").unwrap();
        assert!(card.contains("Anna Smirnova"));

        harness.bus.emit(topics::NAVIGATE_BACK, Value::Null);
        harness.shell.process_pending().await;
        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::ChatsList)
        );
    }

    #[tokio::test]
    async fn deleting_the_open_chat_empties_the_secondary_region() {
        let mut harness = harness().await;
        select_seeded_chat(&harness.bus);
        harness.shell.process_pending().await;

        harness.bus.emit(
            topics::CHAT_DELETED,
            events::encode(&ChatDeleted { chat_id: ChatId::new(1) }),
        );
        harness.shell.process_pending().await;

        assert!(harness.secondary_region.markup().contains(EMPTY_STATE_TITLE));
        assert!(!harness.shell.secondary().has_instance());
        // The list dropped the row as well.
        let rows = harness.primary_region.slot("chats").unwrap();
        assert!(!rows.contains("Anna Smirnova"));
    }

    #[tokio::test]
    async fn routed_transient_search_is_skipped_by_back_navigation() {
        let mut harness = harness().await;

        harness.bus.emit(
            topics::ROUTE_REQUESTED,
            events::encode(&RouteRequested {
                route: ComponentKind::Search,
                panel: TargetPanel::Primary,
            }),
        );
        harness.shell.process_pending().await;
        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::Search)
        );
        assert!(harness.primary_region.slot("results").is_some());

        harness.bus.emit(
            topics::ROUTE_REQUESTED,
            events::encode(&RouteRequested {
                route: ComponentKind::ProfileEditor,
                panel: TargetPanel::Primary,
            }),
        );
        harness.shell.process_pending().await;
        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::ProfileEditor)
        );
        let form = harness.primary_region.slot("form").unwrap();
        assert!(form.contains("name=\"username\""));

        // Neither transient visit left a history frame; back lands on root.
        harness.bus.emit(topics::NAVIGATE_BACK, Value::Null);
        harness.shell.process_pending().await;
        assert_eq!(
            harness.shell.primary().current_kind(),
            Some(ComponentKind::ChatsList)
        );
        assert_eq!(harness.shell.primary().stack_len(), 0);
    }

    #[tokio::test]
    async fn open_chat_with_unknown_user_starts_a_draft() {
        let mut harness = harness().await;

        harness.bus.emit(
            topics::OPEN_CHAT_WITH_USER,
            events::encode(&OpenChatWithUser {
                user_id: UserId::new(99),
                user_name: "Stranger".to_string(),
                user_avatar: None,
            }),
        );
        harness.shell.process_pending().await;

        assert_eq!(
            harness.shell.secondary().current_kind(),
            Some(ComponentKind::Chat)
        );
        let header = harness.secondary_region.slot("header").unwrap();
        assert!(header.contains("Stranger"));
    }
}
