pub mod notifier;
pub mod router;
pub mod worker;

pub use notifier::{Notifier, OutboundMessage, WebhookNotifier};
pub use router::{Destination, DestinationBook, DestinationSnapshot, DispatchRouter};
pub use worker::{send_with_timeout, Dispatcher};
