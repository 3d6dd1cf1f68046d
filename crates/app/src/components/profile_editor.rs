use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::component::{ComponentKind, PanelComponent, RegionSurface};
use courier_core::error::PanelResult;
use courier_core::events::{self, ProfileSaveRequested};
use courier_core::{EventBus, topics};
use courier_gateway::{DataGateway, UserRecord};
use serde_json::Value;

use super::{SubscriptionBag, escape_html};

const FORM_SLOT: &str = "form";
const NOTICE_SLOT: &str = "notice";

struct EditorShared {
    alive: AtomicBool,
    is_saving: AtomicBool,
    region: Mutex<Option<Arc<dyn RegionSurface>>>,
}

impl EditorShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            is_saving: AtomicBool::new(false),
            region: Mutex::new(None),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn patch(&self, slot: &str, markup: &str) {
        if !self.is_alive() {
            return;
        }
        if let Some(region) = self
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            region.patch(slot, markup);
        }
    }
}

fn render_form(user: &UserRecord) -> String {
    let field = |name: &str, label: &str, value: &str| {
        format!(
            "<label>{label}<input name=\"{name}\" value=\"{}\" /></label>",
            escape_html(value)
        )
    };
    format!(
        "{name}{username}{bio}{phone}{email}<button type=\"submit\">Save</button>",
        name = field("name", "Name", &user.name),
        username = field("username", "Username", &user.username),
        bio = field("bio", "Bio", user.bio.as_deref().unwrap_or("")),
        phone = field("phone", "Phone", user.phone.as_deref().unwrap_or("")),
        email = field("email", "Email", user.email.as_deref().unwrap_or("")),
    )
}

/// Transient profile editor: renders the current profile as a form and
/// services the save intent; a successful save announces the update and
/// navigates back.
pub struct ProfileEditor {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    shared: Arc<EditorShared>,
    subscriptions: Option<SubscriptionBag>,
}

impl ProfileEditor {
    pub fn new(bus: EventBus, gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            bus,
            gateway,
            shared: Arc::new(EditorShared::new()),
            subscriptions: None,
        }
    }

    fn install_subscriptions(&mut self) {
        let mut bag = SubscriptionBag::new(self.bus.clone());

        let shared = self.shared.clone();
        let gateway = self.gateway.clone();
        let bus = self.bus.clone();
        bag.add(
            topics::PROFILE_SAVE_REQUESTED,
            self.bus.on(topics::PROFILE_SAVE_REQUESTED, move |payload| {
                if !shared.is_alive() {
                    return;
                }
                let Some(event) = events::decode::<ProfileSaveRequested>(payload) else {
                    return;
                };
                let patch = event.patch.normalized();
                if patch.is_empty() {
                    shared.patch(
                        NOTICE_SLOT,
                        "<span class=\"validation-error\">Nothing to save</span>",
                    );
                    return;
                }
                if shared.is_saving.swap(true, Ordering::SeqCst) {
                    tracing::debug!("profile save already in progress, skipping");
                    return;
                }

                let shared = shared.clone();
                let gateway = gateway.clone();
                let bus = bus.clone();
                tokio::spawn(async move {
                    match gateway.update_current_user(patch).await {
                        Ok(user) => {
                            tracing::info!(user_id = %user.id, "profile saved");
                            bus.emit(topics::PROFILE_UPDATED, Value::Null);
                            bus.emit(topics::NAVIGATE_BACK, Value::Null);
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "profile save failed");
                            shared.patch(
                                NOTICE_SLOT,
                                "<span class=\"save-error\">Could not save the profile</span>",
                            );
                        }
                    }
                    shared.is_saving.store(false, Ordering::SeqCst);
                });
            }),
        );

        self.subscriptions = Some(bag);
    }
}

#[async_trait]
impl PanelComponent for ProfileEditor {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ProfileEditor
    }

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        _data: Option<Value>,
    ) -> PanelResult<()> {
        self.shared.alive.store(true, Ordering::SeqCst);
        *self
            .shared
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(region.clone());

        match self.gateway.get_current_user().await {
            Ok(user) => {
                self.shared.patch(FORM_SLOT, &render_form(&user));
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to load profile for editing");
                region.patch(FORM_SLOT, "<p class=\"notice\">Failed to load profile</p>");
            }
        }

        self.install_subscriptions();
        Ok(())
    }

    fn destroy(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(mut bag) = self.subscriptions.take() {
            bag.dispose();
        }
        *self
            .shared
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
