// Change notifier implementations
pub mod email;
pub mod webhook;

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;
