pub mod bus;
pub mod component;
pub mod directory;
pub mod error;
pub mod events;
pub mod panel;
pub mod topics;

pub use bus::{EventBus, SubscriptionId};
pub use component::{
    ComponentKind, ComponentRegistry, MarkupProvider, PanelComponent, RegionSurface,
};
pub use directory::{DirectorySubscription, UserDirectory};
pub use error::{PanelError, PanelResult};
pub use panel::{NavigationEntry, PanelController};
