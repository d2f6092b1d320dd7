//! Zip archives
//!
//! The central directory sits at the end of the file, so archives are read
//! fully into memory and then walked one member at a time.

use super::format::member_path;
use bytes::Bytes;
use std::io::{self, Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

pub type Archive = ZipArchive<Cursor<Bytes>>;

pub fn open(data: Bytes) -> Result<Archive, ZipError> {
    ZipArchive::new(Cursor::new(data))
}

/// Relative path and contents of member `index`, or `None` for directories.
pub fn read_member(archive: &mut Archive, index: usize) -> io::Result<Option<(String, Vec<u8>)>> {
    let mut member = archive.by_index(index).map_err(io::Error::other)?;
    if member.is_dir() {
        return Ok(None);
    }

    let name = member.name().to_string();
    let relative = member_path(&name).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, format!("unsafe member path '{name}'"))
    })?;

    let mut data = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut data)?;
    Ok(Some((relative, data)))
}
