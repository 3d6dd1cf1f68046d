use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::component::{ComponentKind, ComponentRegistry, MarkupProvider, PanelComponent, RegionSurface};
use crate::error::{PanelResult, UnknownComponentSnafu};
use snafu::OptionExt;

/// Snapshot of a previously-active component in a region's back-stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationEntry {
    pub kind: ComponentKind,
    pub data: Option<Value>,
}

struct HistoryConfig {
    root: ComponentKind,
    /// Kinds whose visits are never recorded as history.
    transient: HashSet<ComponentKind>,
}

struct CurrentEntry {
    kind: ComponentKind,
    data: Option<Value>,
    instance: Box<dyn PanelComponent>,
}

/// Owns one screen region: loads a named component into it, guarantees at
/// most one live instance, and (for the primary region) maintains a LIFO
/// navigation history.
///
/// The destroy-before-create ordering is fixed so components never observe
/// two concurrent lifetimes over the same region.
pub struct PanelController {
    label: &'static str,
    region: Arc<dyn RegionSurface>,
    markup: Arc<dyn MarkupProvider>,
    registry: Arc<ComponentRegistry>,
    current: Option<CurrentEntry>,
    stack: Vec<NavigationEntry>,
    history: Option<HistoryConfig>,
}

impl PanelController {
    /// Primary-region form: back-history with a designated root and a set of
    /// transient component kinds.
    pub fn with_history(
        label: &'static str,
        region: Arc<dyn RegionSurface>,
        markup: Arc<dyn MarkupProvider>,
        registry: Arc<ComponentRegistry>,
        root: ComponentKind,
        transient: HashSet<ComponentKind>,
    ) -> Self {
        Self {
            label,
            region,
            markup,
            registry,
            current: None,
            stack: Vec::new(),
            history: Some(HistoryConfig { root, transient }),
        }
    }

    /// Secondary-region form: no back-stack, always destroy-then-load.
    pub fn without_history(
        label: &'static str,
        region: Arc<dyn RegionSurface>,
        markup: Arc<dyn MarkupProvider>,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        Self {
            label,
            region,
            markup,
            registry,
            current: None,
            stack: Vec::new(),
            history: None,
        }
    }

    pub async fn load(&mut self, kind: ComponentKind, data: Option<Value>) -> PanelResult<()> {
        tracing::debug!(region = self.label, component = %kind, "loading component");

        let same_kind = self
            .current
            .as_ref()
            .is_some_and(|current| current.kind == kind);
        let same_data = self
            .current
            .as_ref()
            .is_some_and(|current| current.data == data);

        // Destroy first, push second: the outgoing component must be fully
        // torn down before its snapshot can become history.
        let previous = self.destroy_current();

        if let (Some((previous_kind, previous_data)), Some(history)) = (previous, &self.history) {
            let changed = !same_kind || !same_data;
            if changed && !history.transient.contains(&previous_kind) {
                self.stack.push(NavigationEntry {
                    kind: previous_kind,
                    data: previous_data,
                });
            }
        }

        match self.install_and_init(kind, data).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    region = self.label,
                    component = %kind,
                    error = %error,
                    "component load failed"
                );
                self.region.show_error("Loading error");
                Err(error)
            }
        }
    }

    /// Pops one history frame; an empty stack falls back to the root
    /// component, and landing on the root discards any deeper history.
    pub async fn go_back(&mut self) -> PanelResult<()> {
        let Some(root) = self.history.as_ref().map(|history| history.root) else {
            tracing::warn!(region = self.label, "go-back requested on a region without history");
            return Ok(());
        };

        let Some(entry) = self.stack.pop() else {
            tracing::debug!(region = self.label, "history empty, returning to root");
            return self.load(root, None).await;
        };

        tracing::debug!(region = self.label, component = %entry.kind, "going back");
        self.destroy_current();

        let outcome = self.install_and_init(entry.kind, entry.data).await;
        if let Err(error) = &outcome {
            tracing::warn!(
                region = self.label,
                component = %entry.kind,
                error = %error,
                "failed to restore previous component"
            );
            self.region.show_error("Loading error");
        } else if entry.kind == root {
            // Returning to the root discards deeper history frames.
            self.stack.clear();
        }
        outcome
    }

    pub async fn refresh_current(&mut self) {
        if let Some(current) = self.current.as_mut()
            && let Err(error) = current.instance.refresh().await
        {
            tracing::warn!(
                region = self.label,
                component = %current.kind,
                error = %error,
                "component refresh failed"
            );
        }
    }

    pub fn current_kind(&self) -> Option<ComponentKind> {
        self.current.as_ref().map(|current| current.kind)
    }

    pub fn current_data(&self) -> Option<&Value> {
        self.current.as_ref().and_then(|current| current.data.as_ref())
    }

    pub fn has_instance(&self) -> bool {
        self.current.is_some()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_entries(&self) -> &[NavigationEntry] {
        &self.stack
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Destroys the current component (if any) and shows the empty-state
    /// placeholder; the secondary region uses this when no chat is open.
    pub fn show_empty_state(&mut self, title: &str, hint: &str) {
        self.destroy_current();
        self.region.show_empty(title, hint);
    }

    fn destroy_current(&mut self) -> Option<(ComponentKind, Option<Value>)> {
        let mut current = self.current.take()?;
        tracing::debug!(region = self.label, component = %current.kind, "destroying component");
        current.instance.destroy();
        Some((current.kind, current.data))
    }

    async fn install_and_init(
        &mut self,
        kind: ComponentKind,
        data: Option<Value>,
    ) -> PanelResult<()> {
        let markup = self.markup.fetch(kind).await?;
        self.region.install(&markup);

        let mut instance = self.registry.build(kind).context(UnknownComponentSnafu {
            stage: "build-component",
            kind,
        })?;
        instance.init(self.region.clone(), data.clone()).await?;

        self.current = Some(CurrentEntry { kind, data, instance });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recording region surface.
    #[derive(Default)]
    struct StubSurface {
        installs: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
        empties: Mutex<Vec<String>>,
    }

    impl RegionSurface for StubSurface {
        fn install(&self, markup: &str) {
            self.installs.lock().unwrap().push(markup.to_string());
        }
        fn patch(&self, _slot: &str, _markup: &str) {}
        fn show_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
        fn show_empty(&self, title: &str, _hint: &str) {
            self.empties.lock().unwrap().push(title.to_string());
        }
    }

    struct StubMarkup {
        missing: Option<ComponentKind>,
    }

    #[async_trait]
    impl MarkupProvider for StubMarkup {
        async fn fetch(&self, kind: ComponentKind) -> PanelResult<String> {
            if self.missing == Some(kind) {
                return Err(PanelError::markup_missing(kind));
            }
            Ok(format!("<section data-component=\"{kind}\"></section>"))
        }
    }

    /// Shared ledger asserting the single-instance invariant.
    #[derive(Default)]
    struct ProbeLog {
        alive: AtomicUsize,
        max_alive: AtomicUsize,
        inits: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl ProbeLog {
        fn born(&self) {
            let alive = self.alive.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_alive.fetch_max(alive, Ordering::SeqCst);
            self.inits.fetch_add(1, Ordering::SeqCst);
        }
        fn died(&self) {
            self.alive.fetch_sub(1, Ordering::SeqCst);
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ProbeComponent {
        kind: ComponentKind,
        log: Arc<ProbeLog>,
        initialized: bool,
    }

    #[async_trait]
    impl PanelComponent for ProbeComponent {
        fn kind(&self) -> ComponentKind {
            self.kind
        }

        async fn init(
            &mut self,
            _region: Arc<dyn RegionSurface>,
            _data: Option<Value>,
        ) -> PanelResult<()> {
            self.initialized = true;
            self.log.born();
            Ok(())
        }

        fn destroy(&mut self) {
            if self.initialized {
                self.initialized = false;
                self.log.died();
            }
        }
    }

    struct Fixture {
        surface: Arc<StubSurface>,
        log: Arc<ProbeLog>,
        controller: PanelController,
    }

    fn fixture_with(missing: Option<ComponentKind>) -> Fixture {
        let surface = Arc::new(StubSurface::default());
        let log = Arc::new(ProbeLog::default());
        let mut registry = ComponentRegistry::new();
        for kind in [
            ComponentKind::ChatsList,
            ComponentKind::Chat,
            ComponentKind::Profile,
            ComponentKind::ProfileEditor,
            ComponentKind::Search,
        ] {
            let log = log.clone();
            registry.register(kind, move || {
                Box::new(ProbeComponent {
                    kind,
                    log: log.clone(),
                    initialized: false,
                })
            });
        }

        let controller = PanelController::with_history(
            "primary",
            surface.clone(),
            Arc::new(StubMarkup { missing }),
            Arc::new(registry),
            ComponentKind::ChatsList,
            HashSet::from([ComponentKind::Search, ComponentKind::ProfileEditor]),
        );

        Fixture { surface, log, controller }
    }

    fn fixture() -> Fixture {
        fixture_with(None)
    }

    #[tokio::test]
    async fn at_most_one_instance_is_ever_alive() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 2})))
            .await
            .unwrap();
        fx.controller.load(ComponentKind::Search, None).await.unwrap();
        fx.controller.go_back().await.unwrap();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();

        assert_eq!(fx.log.max_alive.load(Ordering::SeqCst), 1);
        assert_eq!(fx.log.alive.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reloading_the_same_component_and_data_adds_no_history() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 2})))
            .await
            .unwrap();
        assert_eq!(fx.controller.stack_len(), 1);

        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 2})))
            .await
            .unwrap();
        assert_eq!(fx.controller.stack_len(), 1);

        // Same component with different data is real history.
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 3})))
            .await
            .unwrap();
        assert_eq!(fx.controller.stack_len(), 2);
    }

    #[tokio::test]
    async fn transient_components_leave_no_history_frames() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::Profile, None).await.unwrap();
        fx.controller.load(ComponentKind::Search, None).await.unwrap();
        assert_eq!(fx.controller.stack_len(), 1); // profile was pushed

        // Leaving the transient search pushes nothing for it.
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();
        assert_eq!(fx.controller.stack_len(), 1);

        fx.controller.go_back().await.unwrap();
        assert_eq!(fx.controller.current_kind(), Some(ComponentKind::Profile));
    }

    #[tokio::test]
    async fn returning_to_root_collapses_the_stack() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 2})))
            .await
            .unwrap();
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 3})))
            .await
            .unwrap();
        assert_eq!(fx.controller.stack_len(), 2);

        fx.controller.go_back().await.unwrap();
        assert_eq!(fx.controller.current_kind(), Some(ComponentKind::Profile));
        assert_eq!(fx.controller.stack_len(), 1);

        fx.controller.go_back().await.unwrap();
        assert_eq!(fx.controller.current_kind(), Some(ComponentKind::ChatsList));
        assert_eq!(fx.controller.stack_len(), 0);
    }

    #[tokio::test]
    async fn go_back_on_empty_stack_falls_back_to_root() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::Profile, None).await.unwrap();
        fx.controller.clear_stack();

        fx.controller.go_back().await.unwrap();
        assert_eq!(fx.controller.current_kind(), Some(ComponentKind::ChatsList));
        assert_eq!(fx.controller.stack_len(), 0);
    }

    #[tokio::test]
    async fn go_back_never_creates_history() {
        let mut fx = fixture();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();
        fx.controller.load(ComponentKind::Profile, None).await.unwrap();
        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 3})))
            .await
            .unwrap();
        let depth_before = fx.controller.stack_len();

        fx.controller.go_back().await.unwrap();
        assert!(fx.controller.stack_len() < depth_before);
    }

    #[tokio::test]
    async fn spec_navigation_scenario() {
        // chats-list → profile{2} → profile-editor → back lands on profile{2}.
        let mut fx = fixture();
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();

        fx.controller
            .load(ComponentKind::Profile, Some(json!({"userId": 2})))
            .await
            .unwrap();
        assert_eq!(
            fx.controller.stack_entries(),
            &[NavigationEntry { kind: ComponentKind::ChatsList, data: None }]
        );

        fx.controller.load(ComponentKind::ProfileEditor, None).await.unwrap();
        assert_eq!(
            fx.controller.stack_entries(),
            &[
                NavigationEntry { kind: ComponentKind::ChatsList, data: None },
                NavigationEntry {
                    kind: ComponentKind::Profile,
                    data: Some(json!({"userId": 2})),
                },
            ]
        );

        fx.controller.go_back().await.unwrap();
        assert_eq!(fx.controller.current_kind(), Some(ComponentKind::Profile));
        assert_eq!(fx.controller.current_data(), Some(&json!({"userId": 2})));
        assert_eq!(
            fx.controller.stack_entries(),
            &[NavigationEntry { kind: ComponentKind::ChatsList, data: None }]
        );
    }

    #[tokio::test]
    async fn failed_markup_fetch_shows_error_and_leaves_no_instance() {
        let mut fx = fixture_with(Some(ComponentKind::Profile));
        fx.controller.load(ComponentKind::ChatsList, None).await.unwrap();

        let error = fx
            .controller
            .load(ComponentKind::Profile, None)
            .await
            .unwrap_err();
        assert!(matches!(error, PanelError::MarkupMissing { .. }));
        assert!(!fx.controller.has_instance());
        assert_eq!(fx.controller.current_kind(), None);
        assert_eq!(fx.surface.errors.lock().unwrap().len(), 1);
        // The old instance was destroyed before the failed fetch.
        assert_eq!(fx.log.alive.load(Ordering::SeqCst), 0);

        // A retry of the same target is an ordinary load again.
        let retry = fx.controller.load(ComponentKind::Profile, None).await;
        assert!(retry.is_err());
    }

    #[tokio::test]
    async fn secondary_region_offers_no_history() {
        let surface = Arc::new(StubSurface::default());
        let log = Arc::new(ProbeLog::default());
        let mut registry = ComponentRegistry::new();
        {
            let log = log.clone();
            registry.register(ComponentKind::Chat, move || {
                Box::new(ProbeComponent {
                    kind: ComponentKind::Chat,
                    log: log.clone(),
                    initialized: false,
                })
            });
        }
        let mut controller = PanelController::without_history(
            "secondary",
            surface.clone(),
            Arc::new(StubMarkup { missing: None }),
            Arc::new(registry),
        );

        controller
            .load(ComponentKind::Chat, Some(json!({"chat": {"id": 1}})))
            .await
            .unwrap();
        controller
            .load(ComponentKind::Chat, Some(json!({"chat": {"id": 2}})))
            .await
            .unwrap();
        assert_eq!(controller.stack_len(), 0);

        controller.go_back().await.unwrap();
        // Still showing the second chat; go_back is a logged no-op here.
        assert_eq!(controller.current_kind(), Some(ComponentKind::Chat));
        assert_eq!(log.max_alive.load(Ordering::SeqCst), 1);

        controller.show_empty_state("Select a chat", "Choose a chat to start messaging");
        assert!(!controller.has_instance());
        assert_eq!(surface.empties.lock().unwrap().len(), 1);
    }
}
