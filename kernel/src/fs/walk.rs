//! Directory-tree walkers behind the listing and search syscalls.
//!
//! All output is rendered into a caller-supplied byte buffer through
//! [`SliceWriter`]. Depth is encoded as three spaces per level. The
//! path-finding and search walks write a directory's line before
//! descending and erase it again when nothing interesting was found
//! underneath, so the surviving buffer reads as the path down to the hits.

use super::blockdev::BlockDevice;
use super::fat32::{DirectoryEntry, Fat32Driver, FsError, DIR_EXT, DIR_TABLE_ENTRY_COUNT};
use super::search;
use crate::config::{SEARCH_DEPTH_LIMIT, SEARCH_FILE_BUF_SIZE};
use crate::util::SliceWriter;

/// Search algorithm selector, one per syscall number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAlgorithm {
    BoyerMoore,
    KnuthMorrisPratt,
}

impl SearchAlgorithm {
    fn matches(self, pattern: &[u8], text: &[u8]) -> bool {
        match self {
            SearchAlgorithm::BoyerMoore => search::boyer_moore(pattern, text),
            SearchAlgorithm::KnuthMorrisPratt => search::knuth_morris_pratt(pattern, text),
        }
    }
}

fn trimmed(field: &[u8]) -> &[u8] {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..len]
}

fn write_indent(out: &mut SliceWriter, level: usize) {
    for _ in 0..level {
        out.push_bytes(b"   ");
    }
}

/// `name/` for directories, `name.ext` for files, bare `name` when the
/// extension is empty.
fn write_label(out: &mut SliceWriter, entry: &DirectoryEntry) {
    out.push_bytes(trimmed(&entry.name));
    if entry.ext == DIR_EXT {
        out.push_byte(b'/');
    } else if entry.ext != [0; 3] {
        out.push_byte(b'.');
        out.push_bytes(trimmed(&entry.ext));
    }
}

/// Flat listing of one directory, one entry per line.
pub fn list_dir_content<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
) -> Result<(), FsError> {
    let table = fs.read_dir_table(dir_cluster)?;
    for i in 1..DIR_TABLE_ENTRY_COUNT {
        let entry = table.entries[i];
        if entry.is_empty() {
            continue;
        }
        write_label(out, &entry);
        out.push_byte(b'\n');
    }
    Ok(())
}

/// Recursive listing of the whole subtree under `dir_cluster`.
pub fn print_tree<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
) -> Result<(), FsError> {
    print_tree_level(fs, out, dir_cluster, 0)
}

fn print_tree_level<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
    level: usize,
) -> Result<(), FsError> {
    let table = fs.read_dir_table(dir_cluster)?;
    for i in 1..DIR_TABLE_ENTRY_COUNT {
        let entry = table.entries[i];
        if entry.is_empty() {
            continue;
        }
        write_indent(out, level);
        write_label(out, &entry);
        out.push_byte(b'\n');
        if entry.ext == DIR_EXT {
            print_tree_level(fs, out, entry.cluster(), level + 1)?;
        }
    }
    Ok(())
}

/// Print the indented path from `dir_cluster` down to the entry named
/// `target` (name match only, so `kaguya` finds `kaguya.txt`). Branches
/// that miss are erased; an empty buffer means nothing matched.
pub fn print_path_to_target<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
    target: &[u8],
) -> Result<bool, FsError> {
    find_path_level(fs, out, dir_cluster, target, 0)
}

fn find_path_level<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
    target: &[u8],
    level: usize,
) -> Result<bool, FsError> {
    let table = fs.read_dir_table(dir_cluster)?;
    let mut found = false;
    for i in 1..DIR_TABLE_ENTRY_COUNT {
        let entry = table.entries[i];
        if entry.is_empty() {
            continue;
        }

        let name_matches = trimmed(&entry.name) == target;
        if entry.ext == DIR_EXT {
            if name_matches {
                write_indent(out, level);
                write_label(out, &entry);
                out.push_byte(b'\n');
                found = true;
            } else {
                let mark = out.len();
                write_indent(out, level);
                write_label(out, &entry);
                out.push_byte(b'\n');
                if find_path_level(fs, out, entry.cluster(), target, level + 1)? {
                    found = true;
                } else {
                    out.truncate_to(mark);
                }
            }
        } else if name_matches {
            write_indent(out, level);
            write_label(out, &entry);
            out.push_byte(b'\n');
            found = true;
        }
    }
    Ok(found)
}

/// Depth-limited search for `pattern` in every `txt` file under
/// `dir_cluster`. Matching files are listed with their content, path
/// context preserved by the same erase-on-miss rule as the path printer.
pub fn search_text<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
    pattern: &[u8],
    algorithm: SearchAlgorithm,
) -> Result<bool, FsError> {
    search_level(fs, out, dir_cluster, pattern, algorithm, 0)
}

fn search_level<D: BlockDevice>(
    fs: &mut Fat32Driver<D>,
    out: &mut SliceWriter,
    dir_cluster: u32,
    pattern: &[u8],
    algorithm: SearchAlgorithm,
    level: usize,
) -> Result<bool, FsError> {
    if level > SEARCH_DEPTH_LIMIT {
        return Ok(false);
    }

    let table = fs.read_dir_table(dir_cluster)?;
    let mut found = false;
    for i in 1..DIR_TABLE_ENTRY_COUNT {
        let entry = table.entries[i];
        if entry.is_empty() {
            continue;
        }

        if entry.ext == DIR_EXT {
            let mark = out.len();
            write_indent(out, level);
            write_label(out, &entry);
            out.push_byte(b'\n');
            if search_level(fs, out, entry.cluster(), pattern, algorithm, level + 1)? {
                found = true;
            } else {
                out.truncate_to(mark);
            }
        } else if entry.ext == *b"txt" {
            if entry.filesize as usize > SEARCH_FILE_BUF_SIZE {
                log::debug!("search: skipping oversized file ({} bytes)", entry.filesize);
                continue;
            }
            let mut content = [0u8; SEARCH_FILE_BUF_SIZE];
            let size = match fs.read(&entry.name, &entry.ext, dir_cluster, &mut content) {
                Ok(size) => size as usize,
                Err(_) => continue,
            };
            if algorithm.matches(pattern, &content[..size]) {
                write_indent(out, level);
                write_label(out, &entry);
                out.push_byte(b' ');
                out.push_bytes(trimmed(&content[..size]));
                out.push_byte(b'\n');
                found = true;
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::blockdev::RamBlockDevice;
    use crate::fs::fat32::{CLUSTER_BLOCK_COUNT, CLUSTER_MAP_SIZE, ROOT_CLUSTER_NUMBER};

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

    /// /docs/kaguya.txt ("hello world"), /docs/deep/note.txt ("nothing
    /// here"), /readme.txt ("help")
    fn sample_tree() -> (Fat32Driver<RamBlockDevice>, u32, u32) {
        let blocks = (CLUSTER_MAP_SIZE * CLUSTER_BLOCK_COUNT) as u32;
        let mut fs = Fat32Driver::mount(RamBlockDevice::new(blocks)).unwrap();

        fs.write(&name8("docs"), &[0; 3], ROOT_CLUSTER_NUMBER, &[]).unwrap();
        let docs = fs.resolve_child(&name8("docs"), ROOT_CLUSTER_NUMBER).unwrap();
        fs.write(&name8("kaguya"), &ext3("txt"), docs, b"hello world").unwrap();
        fs.write(&name8("deep"), &[0; 3], docs, &[]).unwrap();
        let deep = fs.resolve_child(&name8("deep"), docs).unwrap();
        fs.write(&name8("note"), &ext3("txt"), deep, b"nothing here").unwrap();
        fs.write(&name8("readme"), &ext3("txt"), ROOT_CLUSTER_NUMBER, b"help").unwrap();

        (fs, docs, deep)
    }

    fn run<F>(f: F) -> std::string::String
    where
        F: FnOnce(&mut SliceWriter),
    {
        let mut buf = [0u8; 1024];
        let mut out = SliceWriter::new(&mut buf);
        f(&mut out);
        let len = out.len();
        std::string::String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[test]
    fn flat_listing_marks_kinds() {
        let (mut fs, _, _) = sample_tree();
        let text = run(|out| list_dir_content(&mut fs, out, ROOT_CLUSTER_NUMBER).unwrap());
        assert_eq!(text, "docs/\nreadme.txt\n");
    }

    #[test]
    fn tree_print_indents_by_depth() {
        let (mut fs, _, _) = sample_tree();
        let text = run(|out| {
            print_tree(&mut fs, out, ROOT_CLUSTER_NUMBER).unwrap();
        });
        assert_eq!(
            text,
            "docs/\n   kaguya.txt\n   deep/\n      note.txt\nreadme.txt\n"
        );
    }

    #[test]
    fn path_to_nested_file() {
        let (mut fs, _, _) = sample_tree();
        let text = run(|out| {
            assert!(print_path_to_target(&mut fs, out, ROOT_CLUSTER_NUMBER, b"kaguya").unwrap());
        });
        assert_eq!(text, "docs/\n   kaguya.txt\n");
    }

    #[test]
    fn path_to_directory() {
        let (mut fs, _, _) = sample_tree();
        let text = run(|out| {
            assert!(print_path_to_target(&mut fs, out, ROOT_CLUSTER_NUMBER, b"deep").unwrap());
        });
        assert_eq!(text, "docs/\n   deep/\n");
    }

    #[test]
    fn path_to_missing_target_leaves_buffer_empty() {
        let (mut fs, _, _) = sample_tree();
        let text = run(|out| {
            assert!(!print_path_to_target(&mut fs, out, ROOT_CLUSTER_NUMBER, b"ghost").unwrap());
        });
        assert_eq!(text, "");
    }

    #[test]
    fn search_lists_matching_files_with_content() {
        let (mut fs, _, _) = sample_tree();
        for algorithm in [SearchAlgorithm::BoyerMoore, SearchAlgorithm::KnuthMorrisPratt] {
            let text = run(|out| {
                assert!(
                    search_text(&mut fs, out, ROOT_CLUSTER_NUMBER, b"hello", algorithm).unwrap()
                );
            });
            // deep/ was descended into and erased; readme.txt ("help")
            // does not match
            assert_eq!(text, "docs/\n   kaguya.txt hello world\n");
        }
    }

    #[test]
    fn search_miss_erases_everything() {
        let (mut fs, _, _) = sample_tree();
        for algorithm in [SearchAlgorithm::BoyerMoore, SearchAlgorithm::KnuthMorrisPratt] {
            let text = run(|out| {
                assert!(
                    !search_text(&mut fs, out, ROOT_CLUSTER_NUMBER, b"absent", algorithm).unwrap()
                );
            });
            assert_eq!(text, "");
        }
    }

    #[test]
    fn search_matches_in_sibling_directories() {
        let (mut fs, docs, _) = sample_tree();
        // a second match under deep/, so both branches survive
        let deep = fs.resolve_child(&name8("deep"), docs).unwrap();
        fs.write(&name8("more"), &ext3("txt"), deep, b"hello again").unwrap();

        let text = run(|out| {
            assert!(search_text(
                &mut fs,
                out,
                ROOT_CLUSTER_NUMBER,
                b"hello",
                SearchAlgorithm::KnuthMorrisPratt
            )
            .unwrap());
        });
        assert_eq!(
            text,
            "docs/\n   kaguya.txt hello world\n   deep/\n      more.txt hello again\n"
        );
    }
}
