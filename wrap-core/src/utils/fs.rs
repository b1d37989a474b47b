use std::{
    fs,
    io::{self, BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;

/// Writes `path` through a uniquely named sibling staging file that is
/// renamed into place once `write` and the flush both succeed. On failure the
/// staging file is removed and the destination is left untouched.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> io::Result<()>,
{
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };
    let mut staging = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut staging);
        write(&mut writer)?;
        writer.flush()?;
    }
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}
