use snafu::Snafu;

use crate::component::ComponentKind;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PanelError {
    #[snafu(display("no markup registered for component '{kind}'"))]
    MarkupMissing {
        stage: &'static str,
        kind: ComponentKind,
    },
    #[snafu(display("markup fetch failed for component '{kind}': {details}"))]
    MarkupFetch {
        stage: &'static str,
        kind: ComponentKind,
        details: String,
    },
    #[snafu(display("component '{kind}' is not registered in this region"))]
    UnknownComponent {
        stage: &'static str,
        kind: ComponentKind,
    },
    #[snafu(display("component '{kind}' failed to initialize: {details}"))]
    ComponentInit {
        stage: &'static str,
        kind: ComponentKind,
        details: String,
    },
}

pub type PanelResult<T> = Result<T, PanelError>;

impl PanelError {
    /// Builds the structural init failure a component reports when it cannot
    /// come up at all (fetch failures it can degrade around stay internal).
    pub fn component_init(kind: ComponentKind, details: impl Into<String>) -> Self {
        ComponentInitSnafu {
            stage: "component-init",
            kind,
            details: details.into(),
        }
        .build()
    }

    /// Builds a markup fetch failure for provider implementations.
    pub fn markup_fetch(kind: ComponentKind, details: impl Into<String>) -> Self {
        MarkupFetchSnafu {
            stage: "fetch-markup",
            kind,
            details: details.into(),
        }
        .build()
    }

    /// Builds the missing-template failure for provider implementations.
    pub fn markup_missing(kind: ComponentKind) -> Self {
        MarkupMissingSnafu {
            stage: "fetch-markup",
            kind,
        }
        .build()
    }
}
