//! FAT32-style filesystem driver.
//!
//! On-disk layout (all integers little-endian):
//! - Block 0: 512-byte boot signature identifying a formatted disk.
//! - Cluster 1: the file allocation table, one u32 per cluster.
//! - Cluster 2: the root directory table.
//!
//! A cluster is four 512-byte blocks. A directory table fills exactly one
//! cluster with 64 fixed-size entries; entry 0 is the directory's own
//! header and its cluster fields encode the parent (the `..` back-pointer).
//! Files occupy singly-linked cluster chains terminated by
//! [`FAT_END_OF_FILE`].
//!
//! Operation return codes are part of the syscall ABI the shell consumes;
//! see the `*_wire_code` functions.

use super::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::error::KernelError;
use crate::util::ceil_div;

pub const CLUSTER_BLOCK_COUNT: usize = 4;
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * CLUSTER_BLOCK_COUNT;
/// Clusters tracked by the FAT: one cluster of u32 entries.
pub const CLUSTER_MAP_SIZE: usize = CLUSTER_SIZE / 4;

pub const BOOT_SECTOR_LBA: u32 = 0;
pub const FAT_CLUSTER_NUMBER: u32 = 1;
pub const ROOT_CLUSTER_NUMBER: u32 = 2;

pub const CLUSTER_0_VALUE: u32 = 0x0FFF_FFF0;
pub const CLUSTER_1_VALUE: u32 = 0x0FFF_FFFF;
pub const FAT_END_OF_FILE: u32 = 0x0FFF_FFFF;
pub const FAT_EMPTY: u32 = 0x0000_0000;

/// Attribute bit marking a directory entry as a subdirectory.
pub const ATTR_SUBDIRECTORY: u8 = 0x10;
/// User-attribute value marking an entry as occupied.
pub const UATTR_NOT_EMPTY: u8 = 0x55;

/// Extension reserved for subdirectories.
pub const DIR_EXT: [u8; 3] = *b"dir";

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_TABLE_ENTRY_COUNT: usize = CLUSTER_SIZE / DIR_ENTRY_SIZE;

/// Boot-block signature written on format.
pub const FS_SIGNATURE: [u8; BLOCK_SIZE] = build_signature();

const fn build_signature() -> [u8; BLOCK_SIZE] {
    const BANNER: &[u8] = b"ferrite filesystem v0.1\nformat with mkfs-fat32, mount r/w\n";
    let mut sig = [0u8; BLOCK_SIZE];
    let mut i = 0;
    while i < BANNER.len() {
        sig[i] = BANNER[i];
        i += 1;
    }
    sig[BLOCK_SIZE - 2] = b'O';
    sig[BLOCK_SIZE - 1] = b'k';
    sig
}

/// Filesystem error taxonomy. The syscall boundary flattens these back to
/// the per-operation integer codes the shell branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Matched a directory where a file was expected
    NotAFile,
    /// Matched a file where a directory was expected
    NotAFolder,
    /// No entry matched (name, ext) in the parent
    NotFound,
    /// Caller buffer smaller than the stored file
    BufferTooSmall,
    /// (name, ext) already present in the parent
    AlreadyExists,
    /// Parent cluster does not hold a directory table
    InvalidParent,
    /// Not enough empty clusters or directory slots
    NoSpace,
    /// Delete target is a directory with children
    FolderNotEmpty,
    /// A cluster chain left the valid range or cycled
    CorruptChain,
    /// Block device failure
    Device(KernelError),
}

impl From<KernelError> for FsError {
    fn from(err: KernelError) -> Self {
        FsError::Device(err)
    }
}

/// `read` wire codes: 0 ok, 1 not-a-file, 2 buffer-too-small, 3 not-found.
pub fn read_wire_code(result: &Result<u32, FsError>) -> i8 {
    match result {
        Ok(_) => 0,
        Err(FsError::NotAFile) => 1,
        Err(FsError::BufferTooSmall) => 2,
        Err(FsError::NotFound) => 3,
        Err(_) => -1,
    }
}

/// `read_directory` wire codes: 0 ok, 1 not-a-folder, 2 not-found.
pub fn read_directory_wire_code(result: &Result<DirectoryTable, FsError>) -> i8 {
    match result {
        Ok(_) => 0,
        Err(FsError::NotAFolder) => 1,
        Err(FsError::NotFound) => 2,
        Err(_) => -1,
    }
}

/// `write` wire codes: 0 ok, 1 exists, 2 bad parent, -1 no space/other.
pub fn write_wire_code(result: &Result<(), FsError>) -> i8 {
    match result {
        Ok(()) => 0,
        Err(FsError::AlreadyExists) => 1,
        Err(FsError::InvalidParent) => 2,
        Err(_) => -1,
    }
}

/// `delete` wire codes: 0 ok, 1 not-found, 2 folder-not-empty.
pub fn delete_wire_code(result: &Result<(), FsError>) -> i8 {
    match result {
        Ok(()) => 0,
        Err(FsError::NotFound) => 1,
        Err(FsError::FolderNotEmpty) => 2,
        Err(_) => -1,
    }
}

/// One 32-byte directory entry.
///
/// Disk layout: name 0..8, ext 8..11, attribute 11, user attribute 12,
/// cluster high 13..15, cluster low 15..17, filesize 17..21, zero padding
/// to 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub attribute: u8,
    pub user_attribute: u8,
    pub cluster_high: u16,
    pub cluster_low: u16,
    pub filesize: u32,
}

impl DirectoryEntry {
    pub const EMPTY: Self = Self {
        name: [0; 8],
        ext: [0; 3],
        attribute: 0,
        user_attribute: 0,
        cluster_high: 0,
        cluster_low: 0,
        filesize: 0,
    };

    /// Free slot: name and extension both zero.
    pub fn is_empty(&self) -> bool {
        self.name == [0; 8] && self.ext == [0; 3]
    }

    pub fn is_occupied(&self) -> bool {
        self.user_attribute == UATTR_NOT_EMPTY
    }

    pub fn is_subdirectory(&self) -> bool {
        self.attribute == ATTR_SUBDIRECTORY
    }

    /// Starting cluster, split across the low/high halves on disk.
    pub fn cluster(&self) -> u32 {
        self.cluster_low as u32 | ((self.cluster_high as u32) << 16)
    }

    pub fn set_cluster(&mut self, cluster: u32) {
        self.cluster_low = (cluster & 0xFFFF) as u16;
        self.cluster_high = ((cluster >> 16) & 0xFFFF) as u16;
    }

    /// Byte-exact match over the padded name and extension.
    pub fn matches(&self, name: &[u8; 8], ext: &[u8; 3]) -> bool {
        self.name == *name && self.ext == *ext
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.name);
        buf[8..11].copy_from_slice(&self.ext);
        buf[11] = self.attribute;
        buf[12] = self.user_attribute;
        buf[13..15].copy_from_slice(&self.cluster_high.to_le_bytes());
        buf[15..17].copy_from_slice(&self.cluster_low.to_le_bytes());
        buf[17..21].copy_from_slice(&self.filesize.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&buf[0..8]);
        ext.copy_from_slice(&buf[8..11]);
        Self {
            name,
            ext,
            attribute: buf[11],
            user_attribute: buf[12],
            cluster_high: u16::from_le_bytes([buf[13], buf[14]]),
            cluster_low: u16::from_le_bytes([buf[15], buf[16]]),
            filesize: u32::from_le_bytes([buf[17], buf[18], buf[19], buf[20]]),
        }
    }
}

/// One directory table: a full cluster of 64 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryTable {
    pub entries: [DirectoryEntry; DIR_TABLE_ENTRY_COUNT],
}

impl DirectoryTable {
    /// Fresh table whose self header (entry 0) stores the parent cluster,
    /// encoding the `..` back-pointer.
    pub fn new(name: &[u8; 8], parent_cluster: u32) -> Self {
        let mut table = Self {
            entries: [DirectoryEntry::EMPTY; DIR_TABLE_ENTRY_COUNT],
        };
        table.entries[0].name = *name;
        table.entries[0].ext = DIR_EXT;
        table.entries[0].attribute = ATTR_SUBDIRECTORY;
        table.entries[0].user_attribute = UATTR_NOT_EMPTY;
        table.entries[0].set_cluster(parent_cluster);
        table
    }

    /// Whether this cluster actually holds a directory.
    pub fn is_directory(&self) -> bool {
        self.entries[0].is_subdirectory()
    }

    /// Cluster of the parent directory (entry 0's encoded cluster).
    pub fn parent_cluster(&self) -> u32 {
        self.entries[0].cluster()
    }

    /// Index of the occupied child matching (name, ext).
    pub fn find(&self, name: &[u8; 8], ext: &[u8; 3]) -> Option<usize> {
        (1..DIR_TABLE_ENTRY_COUNT)
            .find(|&i| self.entries[i].is_occupied() && self.entries[i].matches(name, ext))
    }

    /// First free child slot.
    pub fn find_empty_slot(&self) -> Option<usize> {
        (1..DIR_TABLE_ENTRY_COUNT).find(|&i| !self.entries[i].is_occupied())
    }

    /// True when no child slot is occupied.
    pub fn is_childless(&self) -> bool {
        (1..DIR_TABLE_ENTRY_COUNT).all(|i| !self.entries[i].is_occupied())
    }

    pub fn to_bytes(&self) -> [u8; CLUSTER_SIZE] {
        let mut buf = [0u8; CLUSTER_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            buf[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8; CLUSTER_SIZE]) -> Self {
        let mut table = Self {
            entries: [DirectoryEntry::EMPTY; DIR_TABLE_ENTRY_COUNT],
        };
        for (i, entry) in table.entries.iter_mut().enumerate() {
            *entry = DirectoryEntry::from_bytes(&buf[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE]);
        }
        table
    }
}

/// The cluster map, cached in driver state and persisted on mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAllocationTable {
    pub cluster_map: [u32; CLUSTER_MAP_SIZE],
}

impl FileAllocationTable {
    /// Freshly formatted map: reserved entries 0/1, root chain, all else
    /// empty.
    pub fn new() -> Self {
        let mut fat = Self {
            cluster_map: [FAT_EMPTY; CLUSTER_MAP_SIZE],
        };
        fat.cluster_map[0] = CLUSTER_0_VALUE;
        fat.cluster_map[1] = CLUSTER_1_VALUE;
        fat.cluster_map[ROOT_CLUSTER_NUMBER as usize] = FAT_END_OF_FILE;
        fat
    }

    pub fn count_empty(&self) -> usize {
        self.cluster_map[2..].iter().filter(|&&e| e == FAT_EMPTY).count()
    }

    pub fn to_bytes(&self) -> [u8; CLUSTER_SIZE] {
        let mut buf = [0u8; CLUSTER_SIZE];
        for (i, entry) in self.cluster_map.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&entry.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8; CLUSTER_SIZE]) -> Self {
        let mut fat = Self {
            cluster_map: [FAT_EMPTY; CLUSTER_MAP_SIZE],
        };
        for (i, entry) in fat.cluster_map.iter_mut().enumerate() {
            *entry = u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]]);
        }
        fat
    }
}

impl Default for FileAllocationTable {
    fn default() -> Self {
        Self::new()
    }
}

const fn cluster_to_lba(cluster: u32) -> u32 {
    cluster * CLUSTER_BLOCK_COUNT as u32
}

/// The driver: a block device plus the cached FAT.
///
/// Directory tables are read into per-call stack buffers; there is no
/// shared scratch state, so nested walks (tree print, search) cannot
/// clobber each other.
pub struct Fat32Driver<D: BlockDevice> {
    device: D,
    fat: FileAllocationTable,
}

impl<D: BlockDevice> Fat32Driver<D> {
    /// Mount the filesystem, formatting the device first when the boot
    /// block does not carry the signature.
    pub fn mount(device: D) -> Result<Self, FsError> {
        let mut driver = Self {
            device,
            fat: FileAllocationTable::new(),
        };
        if driver.is_empty_storage()? {
            log::info!("fat32: empty disk, formatting");
            driver.format()?;
        } else {
            let mut buf = [0u8; CLUSTER_SIZE];
            driver.read_clusters(&mut buf, FAT_CLUSTER_NUMBER)?;
            driver.fat = FileAllocationTable::from_bytes(&buf);
        }
        Ok(driver)
    }

    fn is_empty_storage(&mut self) -> Result<bool, FsError> {
        let mut boot_sector = [0u8; BLOCK_SIZE];
        self.device.read_blocks(BOOT_SECTOR_LBA, &mut boot_sector)?;
        Ok(boot_sector != FS_SIGNATURE)
    }

    /// Write the signature, a fresh FAT, and an empty root directory whose
    /// self entry points at itself.
    fn format(&mut self) -> Result<(), FsError> {
        self.device.write_blocks(BOOT_SECTOR_LBA, &FS_SIGNATURE)?;

        self.fat = FileAllocationTable::new();
        self.persist_fat()?;

        let root = DirectoryTable::new(b"root\0\0\0\0", ROOT_CLUSTER_NUMBER);
        self.write_dir_table(ROOT_CLUSTER_NUMBER, &root)
    }

    fn read_clusters(&mut self, buf: &mut [u8; CLUSTER_SIZE], cluster: u32) -> Result<(), FsError> {
        self.device.read_blocks(cluster_to_lba(cluster), buf)?;
        Ok(())
    }

    fn write_clusters(&mut self, buf: &[u8; CLUSTER_SIZE], cluster: u32) -> Result<(), FsError> {
        self.device.write_blocks(cluster_to_lba(cluster), buf)?;
        Ok(())
    }

    fn persist_fat(&mut self) -> Result<(), FsError> {
        let bytes = self.fat.to_bytes();
        self.write_clusters(&bytes, FAT_CLUSTER_NUMBER)
    }

    /// Read the directory table stored at `cluster`.
    pub fn read_dir_table(&mut self, cluster: u32) -> Result<DirectoryTable, FsError> {
        let mut buf = [0u8; CLUSTER_SIZE];
        self.read_clusters(&mut buf, cluster)?;
        Ok(DirectoryTable::from_bytes(&buf))
    }

    fn write_dir_table(&mut self, cluster: u32, table: &DirectoryTable) -> Result<(), FsError> {
        let bytes = table.to_bytes();
        self.write_clusters(&bytes, cluster)
    }

    fn parent_table(&mut self, parent_cluster: u32) -> Result<DirectoryTable, FsError> {
        if parent_cluster as usize >= CLUSTER_MAP_SIZE {
            return Err(FsError::InvalidParent);
        }
        let table = self.read_dir_table(parent_cluster)?;
        if !table.is_directory() {
            return Err(FsError::InvalidParent);
        }
        Ok(table)
    }

    /// Read a file into `buf`. The whole file must fit; on success the
    /// stored size is returned and exactly that many bytes are written.
    pub fn read(
        &mut self,
        name: &[u8; 8],
        ext: &[u8; 3],
        parent_cluster: u32,
        buf: &mut [u8],
    ) -> Result<u32, FsError> {
        let max = buf.len() as u32;
        self.read_streaming(name, ext, parent_cluster, max, &mut |offset, chunk| {
            buf[offset..offset + chunk.len()].copy_from_slice(chunk);
        })
    }

    /// Stream a file's content to `sink(offset, chunk)` in chain order.
    /// Fails up front (before any sink call) when the stored size exceeds
    /// `max_size`. The process loader uses this to copy an executable
    /// into a freshly mapped address space.
    pub fn read_streaming(
        &mut self,
        name: &[u8; 8],
        ext: &[u8; 3],
        parent_cluster: u32,
        max_size: u32,
        sink: &mut dyn FnMut(usize, &[u8]),
    ) -> Result<u32, FsError> {
        let table = self.parent_table(parent_cluster)?;
        let index = table.find(name, ext).ok_or(FsError::NotFound)?;
        let entry = table.entries[index];

        if entry.is_subdirectory() {
            return Err(FsError::NotAFile);
        }
        if max_size < entry.filesize {
            return Err(FsError::BufferTooSmall);
        }

        let mut cluster = entry.cluster();
        let mut remaining = entry.filesize as usize;
        let mut offset = 0usize;
        let mut steps = 0usize;
        while remaining > 0 {
            if steps >= CLUSTER_MAP_SIZE || cluster as usize >= CLUSTER_MAP_SIZE || cluster < 2 {
                return Err(FsError::CorruptChain);
            }
            let mut chunk = [0u8; CLUSTER_SIZE];
            self.read_clusters(&mut chunk, cluster)?;
            let take = remaining.min(CLUSTER_SIZE);
            sink(offset, &chunk[..take]);
            offset += take;
            remaining -= take;
            steps += 1;

            if remaining > 0 {
                cluster = self.fat.cluster_map[cluster as usize];
            }
        }
        Ok(entry.filesize)
    }

    /// Look up a subdirectory under the parent and return its table.
    pub fn read_directory(
        &mut self,
        name: &[u8; 8],
        ext: &[u8; 3],
        parent_cluster: u32,
    ) -> Result<DirectoryTable, FsError> {
        let table = self.parent_table(parent_cluster)?;
        let index = table.find(name, ext).ok_or(FsError::NotFound)?;
        let entry = table.entries[index];
        if !entry.is_subdirectory() {
            return Err(FsError::NotAFolder);
        }
        self.read_dir_table(entry.cluster())
    }

    /// Create a file from `data`, or a subdirectory when `data` is empty.
    ///
    /// Capacity (FAT clusters and a parent slot) is verified before any
    /// cluster is touched, so a failed write leaves the disk unchanged.
    pub fn write(
        &mut self,
        name: &[u8; 8],
        ext: &[u8; 3],
        parent_cluster: u32,
        data: &[u8],
    ) -> Result<(), FsError> {
        let mut parent = self.parent_table(parent_cluster)?;

        for i in 1..DIR_TABLE_ENTRY_COUNT {
            let entry = &parent.entries[i];
            if entry.is_occupied() && entry.matches(name, ext) {
                return Err(FsError::AlreadyExists);
            }
        }

        let slot = parent.find_empty_slot().ok_or(FsError::NoSpace)?;
        let create_folder = data.is_empty();
        let cluster_count = if create_folder { 1 } else { ceil_div(data.len() as u32, CLUSTER_SIZE as u32) as usize };
        if self.fat.count_empty() < cluster_count {
            return Err(FsError::NoSpace);
        }

        // claim the first free clusters, in order
        let mut chain = [0u32; CLUSTER_MAP_SIZE];
        let mut found = 0usize;
        for i in 2..CLUSTER_MAP_SIZE {
            if found == cluster_count {
                break;
            }
            if self.fat.cluster_map[i] == FAT_EMPTY {
                chain[found] = i as u32;
                found += 1;
            }
        }

        let mut new_entry = DirectoryEntry {
            name: *name,
            ext: if create_folder { DIR_EXT } else { *ext },
            attribute: if create_folder { ATTR_SUBDIRECTORY } else { 0 },
            user_attribute: UATTR_NOT_EMPTY,
            cluster_high: 0,
            cluster_low: 0,
            filesize: data.len() as u32,
        };
        new_entry.set_cluster(chain[0]);

        if create_folder {
            self.fat.cluster_map[chain[0] as usize] = FAT_END_OF_FILE;
            let child = DirectoryTable::new(name, parent_cluster);
            self.write_dir_table(chain[0], &child)?;
        } else {
            for i in 0..cluster_count {
                let cluster = chain[i];
                self.fat.cluster_map[cluster as usize] = if i == cluster_count - 1 {
                    FAT_END_OF_FILE
                } else {
                    chain[i + 1]
                };

                let mut chunk = [0u8; CLUSTER_SIZE];
                let start = i * CLUSTER_SIZE;
                let take = (data.len() - start).min(CLUSTER_SIZE);
                chunk[..take].copy_from_slice(&data[start..start + take]);
                self.write_clusters(&chunk, cluster)?;
            }
        }

        parent.entries[slot] = new_entry;
        self.write_dir_table(parent_cluster, &parent)?;
        self.persist_fat()
    }

    /// Delete a file or an empty subdirectory.
    pub fn delete(
        &mut self,
        name: &[u8; 8],
        ext: &[u8; 3],
        parent_cluster: u32,
    ) -> Result<(), FsError> {
        let mut parent = self.parent_table(parent_cluster)?;
        let index = parent.find(name, ext).ok_or(FsError::NotFound)?;
        let entry = parent.entries[index];

        if entry.is_subdirectory() {
            let child = self.read_dir_table(entry.cluster())?;
            if !child.is_childless() {
                return Err(FsError::FolderNotEmpty);
            }
        }

        parent.entries[index] = DirectoryEntry::EMPTY;

        // release the whole chain
        let mut cluster = entry.cluster();
        let mut steps = 0usize;
        loop {
            if steps >= CLUSTER_MAP_SIZE || cluster as usize >= CLUSTER_MAP_SIZE || cluster < 2 {
                return Err(FsError::CorruptChain);
            }
            let next = self.fat.cluster_map[cluster as usize];
            self.fat.cluster_map[cluster as usize] = FAT_EMPTY;
            if next == FAT_END_OF_FILE {
                break;
            }
            cluster = next;
            steps += 1;
        }

        self.write_dir_table(parent_cluster, &parent)?;
        self.persist_fat()
    }

    /// Cluster of the named child subdirectory.
    pub fn resolve_child(&mut self, name: &[u8; 8], parent_cluster: u32) -> Result<u32, FsError> {
        let table = self.parent_table(parent_cluster)?;
        table
            .find(name, &DIR_EXT)
            .map(|i| table.entries[i].cluster())
            .ok_or(FsError::NotFound)
    }

    /// Cluster of the `..` parent of the directory at `cluster`.
    pub fn resolve_parent(&mut self, cluster: u32) -> Result<u32, FsError> {
        let table = self.read_dir_table(cluster)?;
        if !table.is_directory() {
            return Err(FsError::InvalidParent);
        }
        Ok(table.parent_cluster())
    }

    /// Raw FAT entry, for integrity checks.
    pub fn fat_entry(&self, cluster: u32) -> u32 {
        self.fat.cluster_map[cluster as usize]
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Tear the driver apart, returning the device.
    pub fn into_device(self) -> D {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::blockdev::RamBlockDevice;

    const DISK_BLOCKS: u32 = (CLUSTER_MAP_SIZE * CLUSTER_BLOCK_COUNT) as u32;

    fn name8(s: &str) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    fn ext3(s: &str) -> [u8; 3] {
        let mut out = [0u8; 3];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    fn fresh_fs() -> Fat32Driver<RamBlockDevice> {
        Fat32Driver::mount(RamBlockDevice::new(DISK_BLOCKS)).unwrap()
    }

    /// Walk a chain, asserting termination and no revisits; returns length.
    fn chain_len(fs: &Fat32Driver<RamBlockDevice>, start: u32) -> usize {
        let mut visited = [false; CLUSTER_MAP_SIZE];
        let mut cluster = start;
        let mut len = 0;
        loop {
            assert!((cluster as usize) < CLUSTER_MAP_SIZE && cluster >= 2, "chain out of range");
            assert!(!visited[cluster as usize], "chain revisits cluster {cluster}");
            visited[cluster as usize] = true;
            len += 1;
            let next = fs.fat_entry(cluster);
            assert_ne!(next, FAT_EMPTY, "chain walks into an empty cluster");
            if next == FAT_END_OF_FILE {
                return len;
            }
            cluster = next;
        }
    }

    #[test]
    fn entry_codec_roundtrip() {
        let mut entry = DirectoryEntry {
            name: name8("kaguya"),
            ext: ext3("txt"),
            attribute: 0,
            user_attribute: UATTR_NOT_EMPTY,
            cluster_high: 0,
            cluster_low: 0,
            filesize: 1500,
        };
        entry.set_cluster(0x0001_0007);
        assert_eq!(entry.cluster(), 0x0001_0007);

        let decoded = DirectoryEntry::from_bytes(&entry.to_bytes());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn fat_codec_roundtrip() {
        let mut fat = FileAllocationTable::new();
        fat.cluster_map[5] = 9;
        fat.cluster_map[9] = FAT_END_OF_FILE;
        let decoded = FileAllocationTable::from_bytes(&fat.to_bytes());
        assert_eq!(decoded, fat);
    }

    #[test]
    fn format_initializes_reserved_entries_and_root() {
        let mut fs = fresh_fs();
        assert_eq!(fs.fat_entry(0), CLUSTER_0_VALUE);
        assert_eq!(fs.fat_entry(1), CLUSTER_1_VALUE);
        assert_eq!(fs.fat_entry(ROOT_CLUSTER_NUMBER), FAT_END_OF_FILE);

        let root = fs.read_dir_table(ROOT_CLUSTER_NUMBER).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.parent_cluster(), ROOT_CLUSTER_NUMBER);
        assert!(root.is_childless());
    }

    #[test]
    fn write_read_roundtrip_preserves_size() {
        let mut fs = fresh_fs();
        let data: std::vec::Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        fs.write(&name8("a"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &data).unwrap();

        let mut buf = [0u8; 2048];
        let size = fs.read(&name8("a"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf).unwrap();
        assert_eq!(size, 1500);
        assert_eq!(&buf[..1500], &data[..]);
        // bytes past the stored size are untouched
        assert!(buf[1500..].iter().all(|&b| b == 0));
    }

    #[test]
    fn multi_cluster_file_builds_a_chain() {
        let mut fs = fresh_fs();
        let data: std::vec::Vec<u8> = (0..5000u32).map(|i| (i % 241) as u8).collect();
        fs.write(&name8("big"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &data).unwrap();

        let root = fs.read_dir_table(ROOT_CLUSTER_NUMBER).unwrap();
        let idx = root.find(&name8("big"), &ext3("txt")).unwrap();
        let entry = root.entries[idx];
        assert_eq!(entry.filesize, 5000);
        assert_eq!(chain_len(&fs, entry.cluster()), 3);

        let mut buf = std::vec![0u8; 8192];
        let size = fs.read(&name8("big"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf).unwrap();
        assert_eq!(size, 5000);
        assert_eq!(&buf[..5000], &data[..]);
    }

    #[test]
    fn short_buffer_fails_without_partial_fill() {
        let mut fs = fresh_fs();
        let data = [0x5Au8; 600];
        fs.write(&name8("f"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &data).unwrap();

        let mut buf = [0u8; 100];
        let result = fs.read(&name8("f"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf);
        assert_eq!(result, Err(FsError::BufferTooSmall));
        assert_eq!(read_wire_code(&result), 2);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn read_wire_codes() {
        let mut fs = fresh_fs();
        let mut buf = [0u8; 64];
        let missing = fs.read(&name8("nope"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf);
        assert_eq!(missing, Err(FsError::NotFound));
        assert_eq!(read_wire_code(&missing), 3);

        fs.write(&name8("docs"), &[0; 3], ROOT_CLUSTER_NUMBER, &[]).unwrap();
        let folder = fs.read(&name8("docs"), &ext3("dir"), ROOT_CLUSTER_NUMBER, &mut buf);
        assert_eq!(folder, Err(FsError::NotAFile));
        assert_eq!(read_wire_code(&folder), 1);
    }

    #[test]
    fn size_zero_write_creates_a_directory() {
        let mut fs = fresh_fs();
        fs.write(&name8("docs"), &[0; 3], ROOT_CLUSTER_NUMBER, &[]).unwrap();

        let root = fs.read_dir_table(ROOT_CLUSTER_NUMBER).unwrap();
        let idx = root.find(&name8("docs"), &DIR_EXT).unwrap();
        let entry = root.entries[idx];
        assert!(entry.is_subdirectory());
        assert_eq!(entry.ext, DIR_EXT);
        assert_eq!(entry.filesize, 0);

        // the child's self header points back at the parent
        let child = fs.read_dir_table(entry.cluster()).unwrap();
        assert!(child.is_directory());
        assert_eq!(child.parent_cluster(), ROOT_CLUSTER_NUMBER);

        let resolved = fs.resolve_child(&name8("docs"), ROOT_CLUSTER_NUMBER).unwrap();
        assert_eq!(resolved, entry.cluster());
        assert_eq!(fs.resolve_parent(resolved).unwrap(), ROOT_CLUSTER_NUMBER);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut fs = fresh_fs();
        fs.write(&name8("a"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"one").unwrap();
        let dup = fs.write(&name8("a"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"two");
        assert_eq!(dup, Err(FsError::AlreadyExists));
        assert_eq!(write_wire_code(&dup), 1);

        // same name, different extension is a different object
        fs.write(&name8("a"), &ext3("log"), ROOT_CLUSTER_NUMBER, b"three").unwrap();
    }

    #[test]
    fn write_into_bad_parent_is_rejected() {
        let mut fs = fresh_fs();
        // cluster 9 holds no directory table
        let result = fs.write(&name8("x"), &ext3("txt"), 9, b"data");
        assert_eq!(result, Err(FsError::InvalidParent));
        assert_eq!(write_wire_code(&result), 2);
    }

    #[test]
    fn delete_releases_clusters_for_reuse() {
        let mut fs = fresh_fs();
        let data = [7u8; 5000];
        fs.write(&name8("tmp"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &data).unwrap();
        let free_after_write = fs.fat.count_empty();

        fs.delete(&name8("tmp"), &ext3("txt"), ROOT_CLUSTER_NUMBER).unwrap();
        assert_eq!(fs.fat.count_empty(), free_after_write + 3);

        let mut buf = [0u8; 64];
        let gone = fs.read(&name8("tmp"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf);
        assert_eq!(delete_wire_code(&fs.delete(&name8("tmp"), &ext3("txt"), ROOT_CLUSTER_NUMBER)), 1);
        assert_eq!(gone, Err(FsError::NotFound));

        // the freed clusters are reusable
        fs.write(&name8("tmp2"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &data).unwrap();
    }

    #[test]
    fn delete_refuses_non_empty_directory() {
        let mut fs = fresh_fs();
        fs.write(&name8("docs"), &[0; 3], ROOT_CLUSTER_NUMBER, &[]).unwrap();
        let docs = fs.resolve_child(&name8("docs"), ROOT_CLUSTER_NUMBER).unwrap();
        fs.write(&name8("note"), &ext3("txt"), docs, b"hi").unwrap();

        let result = fs.delete(&name8("docs"), &ext3("dir"), ROOT_CLUSTER_NUMBER);
        assert_eq!(result, Err(FsError::FolderNotEmpty));
        assert_eq!(delete_wire_code(&result), 2);

        // nothing changed: the child file is still readable
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(&name8("note"), &ext3("txt"), docs, &mut buf).unwrap(), 2);

        // empty it out, then the directory can go
        fs.delete(&name8("note"), &ext3("txt"), docs).unwrap();
        fs.delete(&name8("docs"), &ext3("dir"), ROOT_CLUSTER_NUMBER).unwrap();
    }

    #[test]
    fn read_directory_distinguishes_files() {
        let mut fs = fresh_fs();
        fs.write(&name8("f"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"x").unwrap();

        let on_file = fs.read_directory(&name8("f"), &ext3("txt"), ROOT_CLUSTER_NUMBER);
        assert!(matches!(on_file, Err(FsError::NotAFolder)));
        assert_eq!(read_directory_wire_code(&on_file), 1);

        let missing = fs.read_directory(&name8("g"), &DIR_EXT, ROOT_CLUSTER_NUMBER);
        assert!(matches!(missing, Err(FsError::NotFound)));
        assert_eq!(read_directory_wire_code(&missing), 2);

        fs.write(&name8("sub"), &[0; 3], ROOT_CLUSTER_NUMBER, &[]).unwrap();
        let table = fs.read_directory(&name8("sub"), &DIR_EXT, ROOT_CLUSTER_NUMBER).unwrap();
        assert_eq!(table.parent_cluster(), ROOT_CLUSTER_NUMBER);
    }

    #[test]
    fn chains_never_share_clusters() {
        let mut fs = fresh_fs();
        fs.write(&name8("a"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &[1u8; 3000]).unwrap();
        fs.write(&name8("b"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &[2u8; 3000]).unwrap();

        let root = fs.read_dir_table(ROOT_CLUSTER_NUMBER).unwrap();
        let mut seen = [false; CLUSTER_MAP_SIZE];
        for i in 1..DIR_TABLE_ENTRY_COUNT {
            let entry = root.entries[i];
            if !entry.is_occupied() {
                continue;
            }
            let mut cluster = entry.cluster();
            loop {
                assert!(!seen[cluster as usize], "cluster {cluster} on two chains");
                seen[cluster as usize] = true;
                assert_ne!(fs.fat_entry(cluster), FAT_EMPTY);
                let next = fs.fat_entry(cluster);
                if next == FAT_END_OF_FILE {
                    break;
                }
                cluster = next;
            }
        }
    }

    #[test]
    fn no_space_when_fat_is_full() {
        let mut fs = fresh_fs();
        // eat every free cluster with one huge file
        let free = fs.fat.count_empty();
        let data = std::vec![0u8; free * CLUSTER_SIZE];
        fs.write(&name8("hog"), &ext3("bin"), ROOT_CLUSTER_NUMBER, &data).unwrap();

        let result = fs.write(&name8("more"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"x");
        assert_eq!(result, Err(FsError::NoSpace));
        assert_eq!(write_wire_code(&result), -1);
    }

    #[test]
    fn remount_reads_persisted_state() {
        let mut fs = fresh_fs();
        fs.write(&name8("keep"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"persist me").unwrap();

        let device = fs.into_device();
        let mut fs = Fat32Driver::mount(device).unwrap();

        let mut buf = [0u8; 64];
        let size = fs.read(&name8("keep"), &ext3("txt"), ROOT_CLUSTER_NUMBER, &mut buf).unwrap();
        assert_eq!(&buf[..size as usize], b"persist me");
    }
}
