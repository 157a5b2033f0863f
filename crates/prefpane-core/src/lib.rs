pub mod backup;
pub mod config;
pub mod dependency;
pub mod dispatch;
pub mod journal;
pub mod lockfile;
pub mod operation;
pub mod parameter;
pub mod password;
pub mod progress;
pub mod proxy;
pub mod sections;
pub mod slot;
pub mod store;
pub mod value;
