pub mod fs_backup;
pub mod retention;
pub mod socks;

pub use fs_backup::FsBackupManager;
pub use socks::{SocksProxy, SocksProxyFactory};
