//! Application collaborators wired to the bus by the runtime.
//!
//! | Collaborator | Subscribes to | Publishes |
//! |--------------|---------------|-----------|
//! | `SceneLoader` | `scene-load` | `scene-ready` (high) |
//! | `Wallet` | `wallet-sync` | `balance-updated` (normal) |
//! | `Alerts` | `message-error`, `scene-ready`, `balance-updated` | nothing |
//!
//! Collaborators only see the bus through `MessageBusApi`.

pub mod alerts;
pub mod scene;
pub mod wallet;

pub use alerts::Alerts;
pub use scene::SceneLoader;
pub use wallet::Wallet;

pub mod events {
    pub const SCENE_LOAD: &str = "scene-load";
    pub const SCENE_READY: &str = "scene-ready";
    pub const WALLET_SYNC: &str = "wallet-sync";
    pub const BALANCE_UPDATED: &str = "balance-updated";
    pub const TELEMETRY_SAMPLE: &str = "telemetry-sample";
}
