pub mod api;
pub mod config;
pub mod db;
pub mod export;
pub mod hardware;
pub mod location;
pub mod notify;
pub mod policy;
pub mod sensors;
pub mod settings;
pub mod store;
pub mod supervisor;
pub mod upload;
pub mod wake_lock;
