pub mod chat;
pub mod chats_list;
pub mod profile;
pub mod profile_editor;
pub mod search;

pub use chat::ChatView;
pub use chats_list::ChatsList;
pub use profile::Profile;
pub use profile_editor::ProfileEditor;
pub use search::Search;

use chrono::{DateTime, Utc};
use courier_core::{EventBus, SubscriptionId};

/// Bus subscriptions owned by one component instance, torn down together in
/// its `destroy`.
pub(crate) struct SubscriptionBag {
    bus: EventBus,
    entries: Vec<(&'static str, SubscriptionId)>,
}

impl SubscriptionBag {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self {
            bus,
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, topic: &'static str, id: SubscriptionId) {
        self.entries.push((topic, id));
    }

    pub(crate) fn dispose(&mut self) {
        for (topic, id) in self.entries.drain(..) {
            self.bus.off(topic, id);
        }
    }
}

impl Drop for SubscriptionBag {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Minimal HTML escaping for user-controlled strings rendered into markup.
pub(crate) fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for character in raw.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_significant_characters() {
        assert_eq!(
            escape_html(r#"<b onclick="x('&')">"#),
            "&lt;b onclick=&quot;x(&#39;&amp;&#39;)&quot;&gt;"
        );
    }
}
