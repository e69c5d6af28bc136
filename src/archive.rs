//! Bundling of a project directory into a temporary `.tar.xz` archive.
//!
//! The walk, the tar stream, and the XZ encoder run as one streaming pass
//! straight into the temp file, so memory use does not grow with the size
//! of the project. Symlinks are neither followed nor archived.

use crate::errors::ArchiveError;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;
use xz2::write::XzEncoder;

/// XZ preset used for bundles (same default as `xz -6`).
pub const XZ_PRESET: u32 = 6;

/// Suffix given to every bundle file.
pub const ARCHIVE_SUFFIX: &str = ".tar.xz";

/// A compressed bundle on local disk.
///
/// The file is deleted when this value is dropped, on every exit path.
#[derive(Debug)]
pub struct ArchiveFile {
    file: NamedTempFile,
    entry_count: usize,
}

impl ArchiveFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of regular files stored in the archive.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Compressed size on disk, in bytes.
    pub fn size(&self) -> Result<u64, ArchiveError> {
        self.file
            .as_file()
            .metadata()
            .map(|m| m.len())
            .map_err(ArchiveError::Write)
    }
}

/// Bundle `source_dir` into a fresh archive in the system temp directory.
pub fn create_archive(source_dir: &Path) -> Result<ArchiveFile, ArchiveError> {
    create_archive_in(source_dir, &std::env::temp_dir())
}

/// Bundle `source_dir` into a fresh archive created inside `temp_dir`.
///
/// Errors reading the source tree surface as [`ArchiveError::Filesystem`];
/// errors creating or writing the archive as [`ArchiveError::Write`].
pub fn create_archive_in(source_dir: &Path, temp_dir: &Path) -> Result<ArchiveFile, ArchiveError> {
    let root_meta = std::fs::metadata(source_dir).map_err(|source| ArchiveError::Filesystem {
        path: source_dir.to_path_buf(),
        source,
    })?;
    if !root_meta.is_dir() {
        return Err(ArchiveError::Filesystem {
            path: source_dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let temp = tempfile::Builder::new()
        .prefix("inferex-bundle-")
        .suffix(ARCHIVE_SUFFIX)
        .tempfile_in(temp_dir)
        .map_err(ArchiveError::Write)?;

    let output = temp.reopen().map_err(ArchiveError::Write)?;
    let encoder = XzEncoder::new(BufWriter::new(output), XZ_PRESET);
    let mut builder = tar::Builder::new(SinkTracker::new(encoder));
    builder.follow_symlinks(false);

    let mut entry_count = 0;
    for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_error(source_dir, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|err| ArchiveError::Filesystem {
                path: entry.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
            })?;
        append_file(&mut builder, entry.path(), relative)?;
        entry_count += 1;
    }

    let encoder = builder.into_inner().map_err(ArchiveError::Write)?.into_inner();
    let mut output = encoder.finish().map_err(ArchiveError::Write)?;
    output.flush().map_err(ArchiveError::Write)?;
    output
        .into_inner()
        .map_err(|err| ArchiveError::Write(err.into_error()))?
        .sync_all()
        .map_err(ArchiveError::Write)?;

    debug!(
        source = %source_dir.display(),
        archive = %temp.path().display(),
        entries = entry_count,
        "bundle archive written"
    );

    Ok(ArchiveFile {
        file: temp,
        entry_count,
    })
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<SinkTracker<W>>,
    path: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let fs_err = |source: io::Error| ArchiveError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(fs_err)?;
    let meta = file.metadata().map_err(fs_err)?;

    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&meta, tar::HeaderMode::Complete);
    header.set_uid(0);
    header.set_gid(0);
    append_sized(builder, &mut header, path, relative, &mut file)
}

/// Append exactly `header.size()` bytes read from `reader`.
///
/// A file that grew since its metadata was read is cut at the recorded size;
/// one that shrank fails with `UnexpectedEof` instead of misaligning the
/// rest of the archive.
fn append_sized<W: Write, R: Read>(
    builder: &mut tar::Builder<SinkTracker<W>>,
    header: &mut tar::Header,
    path: &Path,
    relative: &Path,
    reader: R,
) -> Result<(), ArchiveError> {
    let fs_err = |source: io::Error| ArchiveError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    let len = header.size().map_err(fs_err)?;
    let sized = SizedReader::new(reader, len);

    let appended = builder.append_data(header, relative, sized);
    appended.map_err(|source| {
        // Reads and writes share one io::Result here; the sink knows
        // whether the archive side failed.
        if builder.get_ref().failed {
            ArchiveError::Write(source)
        } else {
            fs_err(source)
        }
    })
}

/// Reader yielding exactly `remaining` bytes, or an error if the source
/// runs dry first.
struct SizedReader<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving ({} bytes missing)", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn walk_error(source_dir: &Path, err: walkdir::Error) -> ArchiveError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source_dir.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
    ArchiveError::Filesystem { path, source }
}

/// Writer adapter that remembers whether the output side ever failed.
struct SinkTracker<W> {
    inner: W,
    failed: bool,
}

impl<W> SinkTracker<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            failed: false,
        }
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for SinkTracker<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.failed = true)
    }
}

/// List the entry names of a bundle, in archive order.
pub fn list_entries(archive: &Path) -> io::Result<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(xz2::read::XzDecoder::new(file));
    let mut names = Vec::new();
    for entry in tar.entries()? {
        names.push(entry?.path()?.into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn project_fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("inferex.yaml"), "name: demo\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src/models")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "print('hello')\n").unwrap();
        std::fs::write(dir.path().join("src/models/weights.bin"), vec![7u8; 4096]).unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "disk gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device removed"))
        }
    }

    fn memory_builder() -> tar::Builder<SinkTracker<Vec<u8>>> {
        tar::Builder::new(SinkTracker::new(Vec::new()))
    }

    fn memory_entries(
        builder: tar::Builder<SinkTracker<Vec<u8>>>,
    ) -> io::Result<Vec<(PathBuf, Vec<u8>)>> {
        let bytes = builder.into_inner()?.into_inner();
        let mut tar = tar::Archive::new(&bytes[..]);
        let mut out = Vec::new();
        for entry in tar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            out.push((name, data));
        }
        Ok(out)
    }

    fn sized_header(len: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(len);
        header
    }

    fn unpack(archive: &Path, dest: &Path) {
        let file = File::open(archive).unwrap();
        let mut tar = tar::Archive::new(xz2::read::XzDecoder::new(file));
        tar.unpack(dest).unwrap();
    }

    #[test]
    fn test_archive_entries_are_relative_regular_files() {
        let project = project_fixture();
        let archive = create_archive(project.path()).unwrap();

        let entries: BTreeSet<PathBuf> = list_entries(archive.path()).unwrap().into_iter().collect();
        let expected: BTreeSet<PathBuf> = ["inferex.yaml", "src/app.py", "src/models/weights.bin"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(entries, expected);
        assert_eq!(archive.entry_count(), 3);
    }

    #[test]
    fn test_archive_round_trip_reproduces_contents() {
        let project = project_fixture();
        let archive = create_archive(project.path()).unwrap();
        let out = TempDir::new().unwrap();
        unpack(archive.path(), out.path());

        assert_eq!(
            std::fs::read_to_string(out.path().join("src/app.py")).unwrap(),
            "print('hello')\n"
        );
        assert_eq!(
            std::fs::read(out.path().join("src/models/weights.bin")).unwrap(),
            vec![7u8; 4096]
        );
        // Directories only appear as parents of files.
        assert!(!out.path().join("empty").exists());
    }

    #[test]
    fn test_archive_has_tar_xz_suffix_and_nonzero_size() {
        let project = project_fixture();
        let archive = create_archive(project.path()).unwrap();
        let name = archive.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(ARCHIVE_SUFFIX));
        assert!(archive.size().unwrap() > 0);
    }

    #[test]
    fn test_archive_deleted_on_drop() {
        let project = project_fixture();
        let archive = create_archive(project.path()).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn test_each_invocation_gets_its_own_file() {
        let project = project_fixture();
        let first = create_archive(project.path()).unwrap();
        let second = create_archive(project.path()).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_empty_directory_produces_valid_archive() {
        let project = TempDir::new().unwrap();
        let archive = create_archive(project.path()).unwrap();
        assert_eq!(archive.entry_count(), 0);
        assert!(list_entries(archive.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_is_filesystem_error() {
        let project = TempDir::new().unwrap();
        let missing = project.path().join("nope");
        let err = create_archive(&missing).unwrap_err();
        match err {
            ArchiveError::Filesystem { path, .. } => assert_eq!(path, missing),
            other => panic!("Expected Filesystem, got {other:?}"),
        }
    }

    #[test]
    fn test_source_file_is_not_a_directory() {
        let project = project_fixture();
        let err = create_archive(&project.path().join("inferex.yaml")).unwrap_err();
        assert!(matches!(err, ArchiveError::Filesystem { .. }));
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let project = project_fixture();
        let missing_tmp = project.path().join("no-such-tmp");
        let err = create_archive_in(project.path(), &missing_tmp).unwrap_err();
        assert!(matches!(err, ArchiveError::Write(_)));
    }

    #[test]
    fn test_custom_temp_dir_is_used() {
        let project = project_fixture();
        let tmp = TempDir::new().unwrap();
        let archive = create_archive_in(project.path(), tmp.path()).unwrap();
        assert_eq!(archive.path().parent().unwrap(), tmp.path());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let project = project_fixture();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "outside").unwrap();
        std::os::unix::fs::symlink(outside.path(), project.path().join("linked-dir")).unwrap();
        std::os::unix::fs::symlink(project.path(), project.path().join("src/loop")).unwrap();
        std::os::unix::fs::symlink(
            project.path().join("src/app.py"),
            project.path().join("app-link.py"),
        )
        .unwrap();

        let archive = create_archive(project.path()).unwrap();
        let entries = list_entries(archive.path()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|p| !p.starts_with("linked-dir")));
        assert!(!entries.contains(&PathBuf::from("app-link.py")));
    }

    #[test]
    fn test_shrunken_file_is_filesystem_error() {
        let mut builder = memory_builder();
        let mut header = sized_header(10);
        let err = append_sized(
            &mut builder,
            &mut header,
            Path::new("/project/log.txt"),
            Path::new("log.txt"),
            &b"abc"[..],
        )
        .unwrap_err();
        match err {
            ArchiveError::Filesystem { path, source } => {
                assert_eq!(path, PathBuf::from("/project/log.txt"));
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("Expected Filesystem, got {other:?}"),
        }
    }

    #[test]
    fn test_grown_file_is_cut_at_recorded_size() {
        let mut builder = memory_builder();
        let mut header = sized_header(3);
        append_sized(
            &mut builder,
            &mut header,
            Path::new("/project/log.txt"),
            Path::new("log.txt"),
            &b"abcdef"[..],
        )
        .unwrap();
        let mut header = sized_header(2);
        append_sized(
            &mut builder,
            &mut header,
            Path::new("/project/b.txt"),
            Path::new("b.txt"),
            &b"hi"[..],
        )
        .unwrap();

        let entries = memory_entries(builder).unwrap();
        assert_eq!(
            entries,
            vec![
                (PathBuf::from("log.txt"), b"abc".to_vec()),
                (PathBuf::from("b.txt"), b"hi".to_vec()),
            ]
        );
    }

    #[test]
    fn test_read_failure_is_filesystem_error() {
        let mut builder = memory_builder();
        let mut header = sized_header(10);
        let err = append_sized(
            &mut builder,
            &mut header,
            Path::new("/project/weights.bin"),
            Path::new("weights.bin"),
            FailingSource,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Filesystem { .. }), "got {err:?}");
    }

    #[test]
    fn test_write_failure_is_write_error() {
        let project = project_fixture();
        let mut builder = tar::Builder::new(SinkTracker::new(FailingSink));
        let err = append_file(
            &mut builder,
            &project.path().join("src/app.py"),
            Path::new("src/app.py"),
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Write(_)), "got {err:?}");
    }

    #[test]
    fn test_header_keeps_mtime_and_zeroes_owner() {
        let project = project_fixture();
        let mut builder = memory_builder();
        append_file(&mut builder, &project.path().join("inferex.yaml"), Path::new("inferex.yaml")).unwrap();

        let bytes = builder.into_inner().unwrap().into_inner();
        let mut tar = tar::Archive::new(&bytes[..]);
        let entry = tar.entries().unwrap().next().unwrap().unwrap();
        let header = entry.header();
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        let expected = std::fs::metadata(project.path().join("inferex.yaml"))
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(header.mtime().unwrap(), expected);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_file_larger_than_its_metadata_keeps_archive_readable() {
        // procfs reports a length of 0 for files with content.
        let project = project_fixture();
        let mut builder = memory_builder();
        append_file(&mut builder, Path::new("/proc/self/status"), Path::new("status")).unwrap();
        append_file(&mut builder, &project.path().join("src/app.py"), Path::new("src/app.py")).unwrap();

        let entries = memory_entries(builder).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], (PathBuf::from("src/app.py"), b"print('hello')\n".to_vec()));
    }
}
