//! System call interface.
//!
//! User code raises `int 0x30` with the call number in eax and arguments
//! in ebx/ecx/edx. Results travel back through caller-provided pointers;
//! the integer codes written there are the filesystem wire codes the
//! shell branches on. Unknown numbers are silently ignored.

#[cfg(target_arch = "x86")]
mod handler;

#[cfg(target_arch = "x86")]
pub use handler::handle;

/// Cap on the output buffers user code hands to the listing syscalls
/// (ls, tree, search, ps, path). The shell allocates buffers of exactly
/// this size.
pub const OUTPUT_BUFFER_LEN: usize = 4096;

/// System call numbers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    // Filesystem CRUD
    ReadFile = 0,
    ReadDirectory = 1,
    Write = 2,
    Delete = 3,

    // Console and keyboard
    GetKeyboardChar = 4,
    PutChar = 5,
    PutString = 6,
    ActivateKeyboard = 7,

    // Navigation and listings
    ResolveChildDirectory = 8,
    ResolveParentDirectory = 9,
    ListDirectory = 10,
    PrintTree = 11,
    SearchTextBm = 12,
    ClearScreen = 13,

    // Processes
    Kill = 14,
    Exec = 15,
    ProcessList = 16,

    // Clock and search
    ReadClock = 17,
    PrintPathToTarget = 18,
    SearchTextKmp = 19,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Syscall::ReadFile),
            1 => Ok(Syscall::ReadDirectory),
            2 => Ok(Syscall::Write),
            3 => Ok(Syscall::Delete),
            4 => Ok(Syscall::GetKeyboardChar),
            5 => Ok(Syscall::PutChar),
            6 => Ok(Syscall::PutString),
            7 => Ok(Syscall::ActivateKeyboard),
            8 => Ok(Syscall::ResolveChildDirectory),
            9 => Ok(Syscall::ResolveParentDirectory),
            10 => Ok(Syscall::ListDirectory),
            11 => Ok(Syscall::PrintTree),
            12 => Ok(Syscall::SearchTextBm),
            13 => Ok(Syscall::ClearScreen),
            14 => Ok(Syscall::Kill),
            15 => Ok(Syscall::Exec),
            16 => Ok(Syscall::ProcessList),
            17 => Ok(Syscall::ReadClock),
            18 => Ok(Syscall::PrintPathToTarget),
            19 => Ok(Syscall::SearchTextKmp),
            _ => Err(()),
        }
    }
}

/// Filesystem request as user code lays it out (field order is ABI;
/// the shell defines the identical struct).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDriverRequest {
    /// User-space buffer address.
    pub buf: u32,
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub parent_cluster: u32,
    /// Buffer/file size in bytes; 0 makes `Write` create a directory.
    pub buffer_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_roundtrip() {
        for n in 0u32..=19 {
            let call = Syscall::try_from(n).unwrap();
            assert_eq!(call as u32, n);
        }
    }

    #[test]
    fn unknown_numbers_are_rejected() {
        assert!(Syscall::try_from(20).is_err());
        assert!(Syscall::try_from(u32::MAX).is_err());
    }

    #[test]
    fn table_matches_the_shell_abi() {
        assert_eq!(Syscall::ReadFile as u32, 0);
        assert_eq!(Syscall::GetKeyboardChar as u32, 4);
        assert_eq!(Syscall::ResolveChildDirectory as u32, 8);
        assert_eq!(Syscall::SearchTextBm as u32, 12);
        assert_eq!(Syscall::Exec as u32, 15);
        assert_eq!(Syscall::ReadClock as u32, 17);
        assert_eq!(Syscall::SearchTextKmp as u32, 19);
    }
}
