use async_trait::async_trait;
use courier_core::{ComponentKind, MarkupProvider, PanelError, PanelResult};

/// Built-in component scaffolds; the stand-in for fetching `html/<name>.html`
/// templates. Dynamic fragments render into the `data-slot` regions.
pub struct StaticTemplates;

impl StaticTemplates {
    pub fn new() -> Self {
        Self
    }

    fn template(kind: ComponentKind) -> Option<&'static str> {
        match kind {
            ComponentKind::ChatsList => Some(
                r#"<div class="chats-list">
  <header class="panel-header">
    <h2>Chats</h2>
    <button class="search-button" data-route="search" data-panel="primary">Search</button>
    <button class="profile-button" data-route="profile" data-panel="primary">Profile</button>
  </header>
  <ul class="chat-items" data-slot="chats"></ul>
</div>"#,
            ),
            ComponentKind::Chat => Some(
                r#"<div class="chat">
  <header class="chat-header" data-slot="header"></header>
  <div class="messages" data-slot="messages"></div>
  <p class="send-notice" data-slot="notice"></p>
  <footer class="composer">
    <input id="message-input" type="text" placeholder="Message" />
    <button id="send-button">&#10148;</button>
  </footer>
</div>"#,
            ),
            ComponentKind::Profile => Some(
                r#"<div class="profile">
  <header class="panel-header">
    <button class="back-button">&#8592;</button>
    <h2>Profile</h2>
  </header>
  <div class="profile-card" data-slot="card"></div>
  <div class="profile-contacts" data-slot="contacts"></div>
</div>"#,
            ),
            ComponentKind::ProfileEditor => Some(
                r#"<div class="profile-editor">
  <header class="panel-header">
    <button class="back-button">&#8592;</button>
    <h2>Edit profile</h2>
  </header>
  <form class="editor-form" data-slot="form"></form>
  <p class="editor-notice" data-slot="notice"></p>
</div>"#,
            ),
            ComponentKind::Search => Some(
                r#"<div class="search">
  <header class="panel-header">
    <button class="back-button">&#8592;</button>
    <input id="search-input" type="text" placeholder="Search users" />
  </header>
  <ul class="search-results" data-slot="results"></ul>
</div>"#,
            ),
        }
    }
}

impl Default for StaticTemplates {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkupProvider for StaticTemplates {
    async fn fetch(&self, kind: ComponentKind) -> PanelResult<String> {
        Self::template(kind)
            .map(str::to_string)
            .ok_or_else(|| PanelError::markup_missing(kind))
    }
}
