use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::component::{ComponentKind, PanelComponent, RegionSurface};
use courier_core::error::PanelResult;
use courier_core::events::{self, ContactActionRequested, UserProfileRequested};
use courier_core::{DirectorySubscription, EventBus, UserDirectory, topics};
use courier_gateway::{Contact, DataGateway, UserId, UserRecord};
use serde_json::Value;

use super::{SubscriptionBag, escape_html};

const CARD_SLOT: &str = "card";
const CONTACTS_SLOT: &str = "contacts";

struct ProfileShared {
    alive: AtomicBool,
    region: Mutex<Option<Arc<dyn RegionSurface>>>,
    state: Mutex<ProfileState>,
}

#[derive(Default)]
struct ProfileState {
    user: Option<UserRecord>,
    viewing_self: bool,
    is_contact: bool,
    contacts: Vec<Contact>,
}

impl ProfileShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            region: Mutex::new(None),
            state: Mutex::new(ProfileState::default()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn render(&self, directory: &UserDirectory) {
        if !self.is_alive() {
            return;
        }
        let (card, contacts) = {
            let state = self.lock_state();
            let Some(user) = state.user.as_ref() else {
                return;
            };
            let online = directory.get_status(user.id);
            (
                render_card(user, online, state.viewing_self, state.is_contact),
                if state.viewing_self {
                    render_contacts(&state.contacts)
                } else {
                    String::new()
                },
            )
        };
        if let Some(region) = self.lock_region().as_ref() {
            region.patch(CARD_SLOT, &card);
            region.patch(CONTACTS_SLOT, &contacts);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ProfileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_region(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn RegionSurface>>> {
        self.region.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn render_card(user: &UserRecord, online: bool, viewing_self: bool, is_contact: bool) -> String {
    let presence = if online {
        "<span class=\"presence online\">online</span>".to_string()
    } else {
        format!(
            "<span class=\"presence\">last seen {}</span>",
            user.last_seen.format("%Y-%m-%d %H:%M")
        )
    };
    let detail = |label: &str, value: &Option<String>| {
        value
            .as_ref()
            .map(|value| {
                format!(
                    "<dt>{label}</dt><dd>{}</dd>",
                    escape_html(value)
                )
            })
            .unwrap_or_default()
    };
    let actions = if viewing_self {
        "<button class=\"edit-profile\" data-route=\"profile-editor\" data-panel=\"primary\">Edit profile</button>"
            .to_string()
    } else {
        let contact_action = if is_contact {
            format!(
                "<button class=\"remove-contact\" data-user-id=\"{}\">Remove contact</button>",
                user.id
            )
        } else {
            format!(
                "<button class=\"add-contact\" data-user-id=\"{}\">Add contact</button>",
                user.id
            )
        };
        format!(
            "{contact_action}<button class=\"open-chat\" data-user-id=\"{}\">Send message</button>",
            user.id
        )
    };

    format!(
        "<div class=\"user-card\" data-user-id=\"{id}\">\
         <h3>{name}</h3><p class=\"username\">@{username}</p>{presence}\
         <dl>{bio}{phone}{email}</dl>\
         <div class=\"actions\">{actions}</div></div>",
        id = user.id,
        name = escape_html(&user.name),
        username = escape_html(&user.username),
        bio = detail("Bio", &user.bio),
        phone = detail("Phone", &user.phone),
        email = detail("Email", &user.email),
    )
}

fn render_contacts(contacts: &[Contact]) -> String {
    if contacts.is_empty() {
        return "<p class=\"notice\">No contacts yet</p>".to_string();
    }
    let mut markup = String::from("<h4>Contacts</h4><ul class=\"contact-items\">");
    for contact in contacts {
        markup.push_str(&format!(
            "<li class=\"contact-item\" data-user-id=\"{id}\">\
             <span class=\"contact-name\">{name}</span>\
             <span class=\"contact-added\">added {added}</span></li>",
            id = contact.user.id,
            name = escape_html(&contact.user.name),
            added = contact.added_at.format("%Y-%m-%d"),
        ));
    }
    markup.push_str("</ul>");
    markup
}

/// Profile panel: the local user's own card with their contact list, or
/// another user's card with contact / open-chat actions.
pub struct Profile {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    directory: Arc<UserDirectory>,
    local_user_id: UserId,
    shared: Arc<ProfileShared>,
    subscriptions: Option<SubscriptionBag>,
    directory_subscription: Option<DirectorySubscription>,
}

impl Profile {
    pub fn new(
        bus: EventBus,
        gateway: Arc<dyn DataGateway>,
        directory: Arc<UserDirectory>,
        local_user_id: UserId,
    ) -> Self {
        Self {
            bus,
            gateway,
            directory,
            local_user_id,
            shared: Arc::new(ProfileShared::new()),
            subscriptions: None,
            directory_subscription: None,
        }
    }

    async fn load_profile(&self, requested: Option<UserId>) -> PanelResult<()> {
        let viewing_self = requested.is_none_or(|user_id| user_id == self.local_user_id);

        let user = match requested.filter(|_| !viewing_self) {
            None => self.gateway.get_current_user().await,
            Some(user_id) => match self.directory.get_user(user_id) {
                Some(user) => Ok(user),
                None => {
                    self.directory.load_users(&[user_id]).await;
                    match self.directory.get_user(user_id) {
                        Some(user) => Ok(user),
                        None => self.gateway.get_user(user_id).await,
                    }
                }
            },
        };

        let user = match user {
            Ok(user) => user,
            Err(error) => {
                tracing::warn!(error = %error, "failed to load profile");
                if let Some(region) = self.shared.lock_region().as_ref() {
                    region.patch(
                        CARD_SLOT,
                        "<p class=\"notice\">Failed to load profile</p>",
                    );
                }
                return Ok(());
            }
        };

        let mut is_contact = false;
        let mut contacts = Vec::new();
        if viewing_self {
            match self.gateway.get_contacts().await {
                Ok(list) => contacts = list,
                Err(error) => {
                    tracing::warn!(error = %error, "failed to load contacts");
                }
            }
        } else {
            match self.gateway.is_contact(user.id).await {
                Ok(flag) => is_contact = flag,
                Err(error) => {
                    tracing::warn!(user_id = %user.id, error = %error, "contact check failed");
                }
            }
        }

        {
            let mut state = self.shared.lock_state();
            state.user = Some(user);
            state.viewing_self = viewing_self;
            state.is_contact = is_contact;
            state.contacts = contacts;
        }
        self.shared.render(&self.directory);
        Ok(())
    }

    fn install_subscriptions(&mut self) {
        let mut bag = SubscriptionBag::new(self.bus.clone());

        {
            let gateway = self.gateway.clone();
            let bus = self.bus.clone();
            let shared = self.shared.clone();
            bag.add(
                topics::CONTACT_ADD_REQUESTED,
                self.bus.on(topics::CONTACT_ADD_REQUESTED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<ContactActionRequested>(payload) else {
                        return;
                    };
                    let gateway = gateway.clone();
                    let bus = bus.clone();
                    tokio::spawn(async move {
                        match gateway.add_contact(event.user_id).await {
                            Ok(added) => {
                                if added {
                                    tracing::info!(user_id = %event.user_id, "contact added");
                                }
                                bus.emit(topics::CONTACTS_UPDATED, Value::Null);
                            }
                            Err(error) => {
                                tracing::warn!(user_id = %event.user_id, error = %error, "failed to add contact");
                            }
                        }
                    });
                }),
            );
        }

        {
            let gateway = self.gateway.clone();
            let bus = self.bus.clone();
            let shared = self.shared.clone();
            bag.add(
                topics::CONTACT_REMOVE_REQUESTED,
                self.bus.on(topics::CONTACT_REMOVE_REQUESTED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<ContactActionRequested>(payload) else {
                        return;
                    };
                    let gateway = gateway.clone();
                    let bus = bus.clone();
                    tokio::spawn(async move {
                        match gateway.remove_contact(event.user_id).await {
                            Ok(_) => {
                                bus.emit(topics::CONTACTS_UPDATED, Value::Null);
                            }
                            Err(error) => {
                                tracing::warn!(user_id = %event.user_id, error = %error, "failed to remove contact");
                            }
                        }
                    });
                }),
            );
        }

        self.subscriptions = Some(bag);

        let shared = self.shared.clone();
        let directory = self.directory.clone();
        self.directory_subscription = Some(self.directory.subscribe(move |_event, _data| {
            shared.render(&directory);
        }));
    }
}

#[async_trait]
impl PanelComponent for Profile {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Profile
    }

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        data: Option<Value>,
    ) -> PanelResult<()> {
        self.shared.alive.store(true, Ordering::SeqCst);
        *self.shared.lock_region() = Some(region);

        let requested = data
            .as_ref()
            .and_then(|value| events::decode::<UserProfileRequested>(value))
            .map(|request| request.user_id);

        self.load_profile(requested).await?;
        self.install_subscriptions();
        Ok(())
    }

    fn destroy(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(mut bag) = self.subscriptions.take() {
            bag.dispose();
        }
        if let Some(subscription) = self.directory_subscription.take() {
            subscription.dispose();
        }
        *self.shared.lock_region() = None;
    }

    async fn refresh(&mut self) -> PanelResult<()> {
        let requested = {
            let state = self.shared.lock_state();
            if state.viewing_self {
                None
            } else {
                state.user.as_ref().map(|user| user.id)
            }
        };
        self.load_profile(requested).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: i64) -> UserRecord {
        UserRecord {
            id: UserId::new(id),
            name: "Anna Smirnova".to_string(),
            username: "anna_s".to_string(),
            avatar_url: None,
            bio: Some("UI/UX Designer".to_string()),
            phone: None,
            email: None,
            is_online: true,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn own_card_offers_the_editor_not_contact_actions() {
        let markup = render_card(&user(1), true, true, false);
        assert!(markup.contains("Edit profile"));
        assert!(!markup.contains("Add contact"));
    }

    #[test]
    fn foreign_card_toggles_between_add_and_remove() {
        let add = render_card(&user(2), false, false, false);
        assert!(add.contains("Add contact"));
        assert!(add.contains("Send message"));

        let remove = render_card(&user(2), false, false, true);
        assert!(remove.contains("Remove contact"));
    }

    #[test]
    fn contact_list_renders_rows_with_added_dates() {
        let contacts = vec![Contact {
            user: user(2),
            added_at: Utc::now(),
        }];
        let markup = render_contacts(&contacts);
        assert!(markup.contains("contact-item"));
        assert!(markup.contains("Anna Smirnova"));
    }
}
