//! Tar (ustar) packing/unpacking for the archive PUT/GET endpoints.

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use tar::{Archive, Builder, Header};

use crate::errors::{Error, Result};

/// Packs a single file's bytes into a ustar stream with one entry named `name`, owned by root
/// with the given mode. Mirrors what `PUT /containers/{id}/archive?path=<dir>` expects: one
/// entry, extracted relative to the directory named in the query string.
pub fn pack_file(
    name: &str,
    bytes: &[u8],
    mode: u32,
) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, name, bytes)?;
    Ok(builder.into_inner()?)
}

/// Packs a directory tree recursively, relative to `root`, for `push`. Rejects symlinks —
/// archive uploads accept files and directories only.
pub fn pack_dir(root: &Path) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    append_dir_recursive(&mut builder, root, root)?;
    Ok(builder.into_inner()?)
}

fn append_dir_recursive<W: io::Write>(
    builder: &mut Builder<W>,
    root: &Path,
    dir: &Path,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(root).expect("walked path is under root");
        let metadata = fs::symlink_metadata(&path)?;

        if metadata.file_type().is_symlink() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to pack symlink: {}", path.display()),
            )));
        } else if metadata.is_dir() {
            builder.append_dir(rel, &path)?;
            append_dir_recursive(builder, root, &path)?;
        } else {
            let mut file = fs::File::open(&path)?;
            builder.append_file(rel, &mut file)?;
        }
    }
    Ok(())
}

/// Extracts the first entry's bytes from a tar stream. Used for `read_file`, which asks the
/// engine for a single-entry archive.
pub fn unpack_first(data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = Archive::new(data);
    let mut entries = archive.entries()?;
    let mut entry = entries.next().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "archive contained no entries",
        ))
    })??;

    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Extracts every entry into `dest`, preserving directory structure, permissions, and symlinks.
/// Used for `pull`.
pub fn unpack_all(
    data: &[u8],
    dest: &Path,
) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(data);
    archive.set_preserve_permissions(true);
    archive.unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_file_then_unpack_first_round_trips() {
        let packed = pack_file("t.bin", b"hello world", 0o644).unwrap();
        let unpacked = unpack_first(&packed).unwrap();
        assert_eq!(unpacked, b"hello world");
    }

    #[test]
    fn pack_dir_then_unpack_all_round_trips_a_small_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/b.txt"), b"b").unwrap();

        let packed = pack_dir(src.path()).unwrap();

        let dest = tempfile::tempdir().unwrap();
        unpack_all(&packed, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(dest.path().join("sub/b.txt")).unwrap(), b"b");
    }

    #[test]
    fn pack_dir_rejects_symlinks() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("real.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(src.path().join("real.txt"), src.path().join("link.txt"))
            .unwrap();

        let err = pack_dir(src.path()).unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
            other => panic!("expected Error::Io, got {:?}", other),
        }
    }
}
