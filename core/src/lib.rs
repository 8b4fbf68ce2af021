pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod plugin;
pub mod process;
pub mod settings;
pub mod task;
pub mod timer;


pub use crate::config::PluginConfig;
pub use crate::error::{CoreError, CoreResult};
pub use crate::gateway::{ClipboardSource, UiGateway};
pub use crate::plugin::Plugin;
pub use crate::settings::{ButtonSettings, DownloadFormat, SettingsPatch};
pub use crate::task::{TaskHandle, TaskKind, TaskResult, TaskStatus};
