pub mod dynamic;
pub mod hot_reload;
pub mod parser;

pub use dynamic::{ConfigSection, DynamicConfig, SharedConfig};
pub use hot_reload::{start_config_watcher, ConfigWatcher, WatcherEvent};
