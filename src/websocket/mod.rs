pub mod broadcast;
pub mod handler;
pub mod subscribers;

pub use broadcast::Broadcaster;
pub use handler::SubscriberHandler;
pub use subscribers::{SubscriberRegistry, DEFAULT_MAX_SUBSCRIBERS};
