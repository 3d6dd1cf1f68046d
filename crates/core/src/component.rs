use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PanelResult;

/// Tagged identity of a panel component; replaces runtime type-name sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    ChatsList,
    Chat,
    Profile,
    ProfileEditor,
    Search,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatsList => "chats-list",
            Self::Chat => "chat",
            Self::Profile => "profile",
            Self::ProfileEditor => "profile-editor",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "chats-list" => Ok(Self::ChatsList),
            "chat" => Ok(Self::Chat),
            "profile" => Ok(Self::Profile),
            "profile-editor" => Ok(Self::ProfileEditor),
            "search" => Ok(Self::Search),
            other => Err(format!("unknown component kind '{other}'")),
        }
    }
}

/// The screen area a controller owns. Implemented by the frontend; the core
/// only pushes content through it.
pub trait RegionSurface: Send + Sync {
    /// Replaces the whole region content with a component's scaffold markup.
    fn install(&self, markup: &str);
    /// Updates one named fragment of the installed scaffold in place.
    fn patch(&self, slot: &str, markup: &str);
    /// Replaces the region with a visible load-failure state.
    fn show_error(&self, message: &str);
    /// Replaces the region with an empty-state placeholder.
    fn show_empty(&self, title: &str, hint: &str);
}

/// Source of component scaffold markup (the stand-in for template fetching).
#[async_trait]
pub trait MarkupProvider: Send + Sync {
    async fn fetch(&self, kind: ComponentKind) -> PanelResult<String>;
}

/// Lifecycle contract every panel component implements.
///
/// `destroy` must tear down every subscription the instance registered and
/// stop in-flight async work from applying its results.
#[async_trait]
pub trait PanelComponent: Send {
    fn kind(&self) -> ComponentKind;

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        data: Option<Value>,
    ) -> PanelResult<()>;

    fn destroy(&mut self);

    async fn refresh(&mut self) -> PanelResult<()> {
        Ok(())
    }
}

type ComponentFactory = Box<dyn Fn() -> Box<dyn PanelComponent> + Send + Sync>;

/// Factory table building a fresh instance per load; one registration per
/// component kind.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<ComponentKind, ComponentFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: ComponentKind,
        factory: impl Fn() -> Box<dyn PanelComponent> + Send + Sync + 'static,
    ) {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn build(&self, kind: ComponentKind) -> Option<Box<dyn PanelComponent>> {
        self.factories.get(&kind).map(|factory| factory())
    }

    pub fn is_registered(&self, kind: ComponentKind) -> bool {
        self.factories.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            ComponentKind::ChatsList,
            ComponentKind::Chat,
            ComponentKind::Profile,
            ComponentKind::ProfileEditor,
            ComponentKind::Search,
        ] {
            assert_eq!(kind.as_str().parse::<ComponentKind>().unwrap(), kind);
        }
        assert!("left-panel".parse::<ComponentKind>().is_err());
    }

    #[test]
    fn kind_serializes_as_kebab_case() {
        let value = serde_json::to_value(ComponentKind::ProfileEditor).unwrap();
        assert_eq!(value, serde_json::json!("profile-editor"));
    }
}
