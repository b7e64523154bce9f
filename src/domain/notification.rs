use super::wallet::OwnerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    OrderCompleted,
    OrderFailed,
    Welcome,
}

/// A best-effort message to an account owner.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Notification {
    pub recipient: OwnerId,
    pub template: Template,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: impl Into<OwnerId>, template: Template) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    fn field(&self, key: &str) -> &str {
        self.data.get(key).map(String::as_str).unwrap_or("-")
    }

    pub fn subject(&self) -> &'static str {
        match self.template {
            Template::OrderCompleted => "Order completed",
            Template::OrderFailed => "Order failed",
            Template::Welcome => "Welcome",
        }
    }

    /// Renders the plain-text body.
    pub fn render(&self) -> String {
        match self.template {
            Template::OrderCompleted => format!(
                "Your order #{} has been completed.\nService: {}\nLink: {}\nQuantity: {}",
                self.field("order_id"),
                self.field("service"),
                self.field("link"),
                self.field("quantity"),
            ),
            Template::OrderFailed => format!(
                "Your order #{} could not be processed.\nReason: {}\nRefunded: ${}",
                self.field("order_id"),
                self.field("reason"),
                self.field("refund_amount"),
            ),
            Template::Welcome => format!(
                "Hi {}, your account is ready. Add funds to start placing orders.",
                self.field("name"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_order_failed() {
        let n = Notification::new("user-1", Template::OrderFailed)
            .with("order_id", "abc")
            .with("reason", "provider down")
            .with("refund_amount", "2.50");
        let body = n.render();
        assert!(body.contains("#abc"));
        assert!(body.contains("provider down"));
        assert!(body.contains("$2.50"));
    }

    #[test]
    fn test_render_missing_field() {
        let n = Notification::new("user-1", Template::Welcome);
        assert!(n.render().contains("Hi -"));
    }
}
