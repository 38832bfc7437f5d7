use flate2::write::GzEncoder;
use flate2::Compression;
use kernelite_core::archive::{extract, ExtractErrorKind, COPY_BLOCK_SIZE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};

fn file_header(size: usize, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size as u64);
    header.set_mode(mode);
    header.set_cksum();
    header
}

fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, body) in files {
        let mut header = file_header(body.len(), 0o644);
        builder.append_data(&mut header, name, *body).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn write_gz(dir: &Path, name: &str, tar: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, gzip(tar)).unwrap();
    path
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.push((relative, fs::read(&path).unwrap()));
            }
        }
    }
    out.sort();
    out
}

#[test]
fn extraction_is_deterministic_across_targets() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_gz(
        dir.path(),
        "pkg.tar.gz",
        &tar_bytes(&[
            ("pkg/__init__.py", b"VERSION = '1.0'\n"),
            ("pkg/data/table.csv", b"a,b\n1,2\n"),
            ("README", b""),
        ]),
    );

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let summary_first = extract(&archive, &first).unwrap();
    let summary_second = extract(&archive, &second).unwrap();

    assert_eq!(summary_first, summary_second);
    assert_eq!(summary_first.files, 3);
    assert_eq!(tree(&first), tree(&second));
    assert_eq!(
        fs::read(first.join("pkg/data/table.csv")).unwrap(),
        b"a,b\n1,2\n"
    );
}

#[test]
fn entry_larger_than_copy_block_streams_intact() {
    let dir = tempfile::tempdir().unwrap();
    let body = patterned(COPY_BLOCK_SIZE * 64 + 17);
    let archive = write_gz(dir.path(), "big.tar.gz", &tar_bytes(&[("lib/big.bin", &body)]));

    let target = dir.path().join("out");
    let summary = extract(&archive, &target).unwrap();

    assert_eq!(summary.bytes_written, body.len() as u64);
    assert_eq!(fs::read(target.join("lib/big.bin")).unwrap(), body);
}

#[test]
fn corrupted_third_header_keeps_first_two_entries() {
    let dir = tempfile::tempdir().unwrap();
    let mut tar = tar_bytes(&[
        ("one.txt", b"first"),
        ("two.txt", b"second"),
        ("three.txt", b"third"),
    ]);
    // Each small entry spans one header block and one data block.
    tar[2 * 1024] ^= 0xff;
    let archive = write_gz(dir.path(), "corrupt.tar.gz", &tar);

    let target = dir.path().join("out");
    let err = extract(&archive, &target).unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::HeaderRead);
    assert_eq!(err.archive(), archive.as_path());
    assert_eq!(fs::read(target.join("one.txt")).unwrap(), b"first");
    assert_eq!(fs::read(target.join("two.txt")).unwrap(), b"second");
    assert!(!target.join("three.txt").exists());
    assert_eq!(fs::read_dir(&target).unwrap().count(), 2);
}

#[test]
fn entry_escaping_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = tar::Builder::new(Vec::new());
    let body = b"owned";
    let mut header = file_header(body.len(), 0o644);
    let name = b"../escape.txt";
    header.as_mut_bytes()[..name.len()].copy_from_slice(name);
    header.set_cksum();
    builder.append(&header, &body[..]).unwrap();
    let archive = write_gz(dir.path(), "escape.tar.gz", &builder.into_inner().unwrap());

    let target = dir.path().join("nested").join("out");
    let err = extract(&archive, &target).unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::HeaderWrite);
    assert_eq!(err.entry(), Some(Path::new("../escape.txt")));
    assert!(!dir.path().join("nested").join("escape.txt").exists());
}

fn link_header(kind: EntryType, link_name: &str) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(0);
    header.set_mode(0o777);
    header.set_link_name(link_name).unwrap();
    header
}

#[cfg(unix)]
#[test]
fn directories_and_links_are_materialized() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = tar::Builder::new(Vec::new());

    let mut directory = Header::new_gnu();
    directory.set_entry_type(EntryType::Directory);
    directory.set_size(0);
    directory.set_mode(0o755);
    builder
        .append_data(&mut directory, "share/empty/", std::io::empty())
        .unwrap();
    let mut file = file_header(4, 0o644);
    builder
        .append_data(&mut file, "share/target.txt", &b"data"[..])
        .unwrap();
    let mut symlink = link_header(EntryType::Symlink, "target.txt");
    builder
        .append_data(&mut symlink, "share/link", std::io::empty())
        .unwrap();
    let mut hard = link_header(EntryType::Link, "share/target.txt");
    builder
        .append_data(&mut hard, "share/hard", std::io::empty())
        .unwrap();
    let mut fifo = Header::new_gnu();
    fifo.set_entry_type(EntryType::Fifo);
    fifo.set_size(0);
    fifo.set_mode(0o644);
    builder
        .append_data(&mut fifo, "share/pipe", std::io::empty())
        .unwrap();

    let archive = write_gz(dir.path(), "mixed.tar.gz", &builder.into_inner().unwrap());
    let target = dir.path().join("out");
    let summary = extract(&archive, &target).unwrap();

    assert_eq!(summary.entries, 5);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.links, 2);
    assert_eq!(summary.skipped, 1);
    assert!(target.join("share/empty").is_dir());
    assert_eq!(
        fs::read_link(target.join("share/link")).unwrap(),
        Path::new("target.txt")
    );
    assert_eq!(fs::read(target.join("share/link")).unwrap(), b"data");
    assert_eq!(fs::read(target.join("share/hard")).unwrap(), b"data");
    assert!(fs::symlink_metadata(target.join("share/pipe")).is_err());
}

#[cfg(unix)]
#[test]
fn writes_through_an_extracted_link_cannot_leave_target() {
    let dir = tempfile::tempdir().unwrap();
    let outside = dir.path().join("outside");
    fs::create_dir_all(&outside).unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut symlink = link_header(EntryType::Symlink, outside.to_str().unwrap());
    builder
        .append_data(&mut symlink, "escape", std::io::empty())
        .unwrap();
    let mut file = file_header(5, 0o644);
    builder
        .append_data(&mut file, "escape/owned.txt", &b"owned"[..])
        .unwrap();
    let archive = write_gz(dir.path(), "linked.tar.gz", &builder.into_inner().unwrap());

    let target = dir.path().join("out");
    let err = extract(&archive, &target).unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::HeaderWrite);
    assert_eq!(err.entry(), Some(Path::new("escape/owned.txt")));
    assert!(!outside.join("owned.txt").exists());
}

#[test]
fn truncated_body_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let body = patterned(200_000);
    let tar = tar_bytes(&[("done.txt", b"complete"), ("big.bin", &body)]);
    // Header and one data block for `done.txt`, then `big.bin`'s header.
    let cut = 3 * 512 + 100_000;
    let archive = write_gz(dir.path(), "cut.tar.gz", &tar[..cut]);

    let target = dir.path().join("out");
    let err = extract(&archive, &target).unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::BodyCopy);
    assert_eq!(err.entry(), Some(Path::new("big.bin")));
    assert!(err.to_string().contains("truncated"));
    assert_eq!(fs::read(target.join("done.txt")).unwrap(), b"complete");
    assert!(!target.join("big.bin").exists());
}

#[cfg(unix)]
#[test]
fn stored_permission_bits_are_applied() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = file_header(3, 0o750);
    builder
        .append_data(&mut header, "bin/run", &b"#!\n"[..])
        .unwrap();
    let archive = write_gz(dir.path(), "exec.tar.gz", &builder.into_inner().unwrap());

    let target = dir.path().join("out");
    extract(&archive, &target).unwrap();

    let mode = fs::metadata(target.join("bin/run")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[test]
fn missing_archive_is_an_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = extract(dir.path().join("absent.tar.gz"), dir.path().join("out")).unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::Open);
    assert!(err.entry().is_none());
    assert!(err.to_string().contains("absent.tar.gz"));
}

#[test]
fn uncompressed_tar_is_an_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.tar.gz");
    fs::write(&path, tar_bytes(&[("a.txt", b"a")])).unwrap();

    let err = extract(&path, dir.path().join("out")).unwrap_err();
    assert_eq!(err.kind(), ExtractErrorKind::Open);
}
