mod account;
mod client;
mod direct;
mod error;
mod poller;
pub mod protocol;
pub mod signing;
mod types;

pub use account::{AccountBridge, AccountConfig, Credential};
pub use client::{CloudClient, CloudClientBuilder};
pub use direct::{DirectClient, DirectClientBuilder, DirectCommand};
pub use error::{Error, Result};
pub use poller::{
    AccountPoller, AccountSource, BridgeStatus, DeviceRegistry, HeaterObserver, InMemoryRegistry,
    PollerConfig, ZoneObserver, group_by_zone,
};
pub use types::*;
