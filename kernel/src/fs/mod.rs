//! On-disk filesystem: block device facade, the FAT32-style driver, the
//! substring-search algorithms, and the directory-tree walkers behind the
//! listing/search syscalls.

pub mod blockdev;
pub mod fat32;
pub mod search;
pub mod walk;

pub use blockdev::BlockDevice;
pub use fat32::{Fat32Driver, FsError};

#[cfg(target_arch = "x86")]
mod mounted {
    use lazy_static::lazy_static;
    use spin::Mutex;

    use super::{Fat32Driver, FsError};
    use crate::drivers::ata::AtaDevice;

    lazy_static! {
        static ref FILESYSTEM: Mutex<Option<Fat32Driver<AtaDevice>>> = Mutex::new(None);
    }

    /// Mount the on-disk filesystem over the ATA device, formatting a
    /// blank disk on the way.
    pub fn init() -> Result<(), FsError> {
        let driver = Fat32Driver::mount(AtaDevice::new())?;
        *FILESYSTEM.lock() = Some(driver);
        log::info!("fat32: mounted ata0");
        Ok(())
    }

    /// Run `f` against the mounted driver; `None` before `init`.
    pub fn with_driver<R>(f: impl FnOnce(&mut Fat32Driver<AtaDevice>) -> R) -> Option<R> {
        let mut guard = FILESYSTEM.lock();
        guard.as_mut().map(f)
    }
}

#[cfg(target_arch = "x86")]
pub use mounted::{init, with_driver};
