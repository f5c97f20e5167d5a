pub mod hub;
pub mod price;
pub mod store;

pub use hub::{Hub, HubConfig, Subscriber, SubscriberId};
pub use price::PriceReading;
pub use store::{StoreConfig, TtlStore};
