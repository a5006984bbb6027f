//! mkfs-fat32 -- Create and populate ferrite disk images
//!
//! Host-side tool. It loads (or zero-creates) a raw disk image into
//! memory, mounts the kernel's own FAT32 driver over it (formatting a
//! blank image on the way), inserts host files under a chosen parent
//! cluster, and writes the image back.
//!
//! Usage:
//!   mkfs-fat32 --image <path> [--size-mb <n>] [--insert <file> <parent-cluster>]...
//!
//! File names are split at the first dot into an 8-byte name and a 3-byte
//! extension, both NUL-padded, exactly as the kernel matches them.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::exit;

use ferrite_kernel::fs::blockdev::RamBlockDevice;
use ferrite_kernel::fs::fat32::{write_wire_code, Fat32Driver, ROOT_CLUSTER_NUMBER};

const DEFAULT_SIZE_MB: usize = 4;

struct Insertion {
    path: PathBuf,
    parent_cluster: u32,
}

struct Args {
    image: PathBuf,
    size_mb: usize,
    insertions: Vec<Insertion>,
}

fn usage() -> ! {
    eprintln!(
        "usage: mkfs-fat32 --image <path> [--size-mb <n>] [--insert <file> <parent-cluster>]..."
    );
    exit(1);
}

fn parse_args() -> Args {
    let mut image = None;
    let mut size_mb = DEFAULT_SIZE_MB;
    let mut insertions = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--image" => image = Some(PathBuf::from(args.next().unwrap_or_else(|| usage()))),
            "--size-mb" => {
                size_mb = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            "--insert" => {
                let path = PathBuf::from(args.next().unwrap_or_else(|| usage()));
                let parent_cluster = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage());
                insertions.push(Insertion { path, parent_cluster });
            }
            _ => usage(),
        }
    }

    Args {
        image: image.unwrap_or_else(|| usage()),
        size_mb,
        insertions,
    }
}

/// Split `file.tar.gz` into (`file`, `tar`): name up to the first dot,
/// extension up to three bytes of what follows it.
fn split_name(file_name: &str) -> ([u8; 8], [u8; 3]) {
    let (stem, ext) = match file_name.split_once('.') {
        Some((stem, rest)) => (stem, rest.split('.').next().unwrap_or("")),
        None => (file_name, ""),
    };

    let mut name8 = [0u8; 8];
    let stem_bytes = stem.as_bytes();
    let n = stem_bytes.len().min(8);
    name8[..n].copy_from_slice(&stem_bytes[..n]);

    let mut ext3 = [0u8; 3];
    let ext_bytes = ext.as_bytes();
    let n = ext_bytes.len().min(3);
    ext3[..n].copy_from_slice(&ext_bytes[..n]);

    (name8, ext3)
}

fn main() {
    let args = parse_args();

    let raw = match fs::read(&args.image) {
        Ok(data) => {
            println!("loaded image {} ({} bytes)", args.image.display(), data.len());
            data
        }
        Err(_) => {
            println!(
                "creating image {} ({} MiB)",
                args.image.display(),
                args.size_mb
            );
            vec![0u8; args.size_mb * 1024 * 1024]
        }
    };

    let device = RamBlockDevice::from_vec(raw);
    let mut driver = match Fat32Driver::mount(device) {
        Ok(driver) => driver,
        Err(err) => {
            eprintln!("mount failed: {err:?}");
            exit(1);
        }
    };

    let mut failed = false;
    for insertion in &args.insertions {
        let data = match fs::read(&insertion.path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("{}: {err}", insertion.path.display());
                failed = true;
                continue;
            }
        };
        let file_name = insertion
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (name, ext) = split_name(file_name);

        let result = driver.write(&name, &ext, insertion.parent_cluster, &data);
        match write_wire_code(&result) {
            0 => println!(
                "inserted {} ({} bytes) under cluster {}",
                file_name,
                data.len(),
                insertion.parent_cluster
            ),
            1 => {
                eprintln!("{file_name}: name already exists");
                failed = true;
            }
            2 => {
                eprintln!(
                    "{}: invalid parent cluster {}",
                    file_name, insertion.parent_cluster
                );
                failed = true;
            }
            _ => {
                eprintln!("{file_name}: write failed ({result:?})");
                failed = true;
            }
        }
    }

    let data = driver.into_device().into_vec();
    if let Err(err) = fs::write(&args.image, &data) {
        eprintln!("writing {}: {err}", args.image.display());
        exit(1);
    }
    println!(
        "wrote {} ({} bytes, root at cluster {})",
        args.image.display(),
        data.len(),
        ROOT_CLUSTER_NUMBER
    );

    if failed {
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_pads_and_truncates() {
        assert_eq!(split_name("shell"), (*b"shell\0\0\0", [0; 3]));
        assert_eq!(split_name("kaguya.txt"), (*b"kaguya\0\0", *b"txt"));
        assert_eq!(split_name("longfilename.text"), (*b"longfile", *b"tex"));
        assert_eq!(split_name("a.b.c"), (*b"a\0\0\0\0\0\0\0", *b"b\0\0"));
    }
}
