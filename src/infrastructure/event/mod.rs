pub mod bus;

pub use bus::{topics, BusSubscription, InvalidationBus};
