//! Configuration module for Granska.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    ChatProvider, DiarizationSettings, FetchSettings, GeneralSettings, ProviderSettings,
    ServerSettings, Settings, StoreSettings,
};
