#![forbid(unsafe_code)]

//! Core: value model, plain attribute storage, and change notification.

pub mod event;
pub mod id;
pub mod store;
pub mod value;

pub use event::{Change, Handler, Notifier, SubscriptionId};
pub use id::{AttrRef, InstanceId, Key};
pub use store::AttributeStore;
pub use value::Value;
