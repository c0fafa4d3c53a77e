use std::{
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::OnceLock,
};

use serde::{Deserialize, Serialize};

/// Identifies the symbol map that resolves the frames of one file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolicationEntry {
    /// The file the symbol map applies to.
    pub file: String,
    /// The identifier of the symbol map.
    pub uuid: String,
}

/// Looks up the symbol map identifier for the files referenced by a trace.
pub trait SymbolIdResolver: Send + Sync {
    /// Returns the identifier of the symbol map covering `file`, if any.
    fn symbol_id(&self, file: &str) -> Option<String>;
}

/// Resolves every file to the GNU build-id of the running executable.
///
/// All frames of a native process come from the same binary (or from
/// libraries without debug information, which are not reported), so the
/// executable's build-id identifies the debug information to upload. The
/// build-id is read on first use and cached.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExecutableBuildId;

impl SymbolIdResolver for ExecutableBuildId {
    fn symbol_id(&self, _file: &str) -> Option<String> {
        static BUILD_ID: OnceLock<Option<String>> = OnceLock::new();

        BUILD_ID
            .get_or_init(|| {
                let executable = std::env::current_exe().ok()?;
                let build_id = read_build_id(&executable);
                if build_id.is_none() {
                    tracing::debug!(
                        executable = %executable.display(),
                        "executable has no GNU build-id"
                    );
                }
                build_id
            })
            .clone()
    }
}

/// Reads the GNU build-id note of an ELF file as lowercase hex.
pub fn read_build_id(path: &Path) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    match find_build_id(&mut file) {
        Ok(build_id) => build_id.map(hex::encode),
        Err(error) => {
            tracing::trace!(path = %path.display(), %error, "failed to read ELF notes");
            None
        }
    }
}

const SHT_NOTE: u32 = 7;
const NT_GNU_BUILD_ID: u32 = 3;

/// Section header fields needed to locate notes.
struct Section {
    kind: u32,
    offset: u64,
    size: u64,
}

fn find_build_id<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut ident = [0u8; 16];
    reader.read_exact(&mut ident)?;
    // Only little-endian objects are parsed.
    if ident[..4] != *b"\x7fELF" || ident[5] != 1 {
        return Ok(None);
    }
    let is_64 = match ident[4] {
        1 => false,
        2 => true,
        _ => return Ok(None),
    };

    let (section_offset, entry_size, entry_count) = if is_64 {
        (read_u64_at(reader, 0x28)?, read_u16_at(reader, 0x3a)?, read_u16_at(reader, 0x3c)?)
    } else {
        (
            u64::from(read_u32_at(reader, 0x20)?),
            read_u16_at(reader, 0x2e)?,
            read_u16_at(reader, 0x30)?,
        )
    };

    for index in 0..u64::from(entry_count) {
        // Header offsets come from the file; overflow means it is malformed.
        let Some(header) = index
            .checked_mul(u64::from(entry_size))
            .and_then(|relative| section_offset.checked_add(relative))
            .filter(|header| header.checked_add(40).is_some())
        else {
            return Ok(None);
        };
        let section = if is_64 {
            Section {
                kind: read_u32_at(reader, header + 4)?,
                offset: read_u64_at(reader, header + 24)?,
                size: read_u64_at(reader, header + 32)?,
            }
        } else {
            Section {
                kind: read_u32_at(reader, header + 4)?,
                offset: u64::from(read_u32_at(reader, header + 16)?),
                size: u64::from(read_u32_at(reader, header + 20)?),
            }
        };
        if section.kind != SHT_NOTE {
            continue;
        }
        if let Some(build_id) = find_note(reader, &section)? {
            return Ok(Some(build_id));
        }
    }

    Ok(None)
}

fn find_note<R: Read + Seek>(reader: &mut R, section: &Section) -> io::Result<Option<Vec<u8>>> {
    let end = section.offset.saturating_add(section.size);
    let mut position = section.offset;

    while let Some(name_start) = position.checked_add(12).filter(|start| *start <= end) {
        let name_size = u64::from(read_u32_at(reader, position)?);
        let desc_size = u64::from(read_u32_at(reader, position + 4)?);
        let kind = read_u32_at(reader, position + 8)?;
        let Some(desc_start) = name_start.checked_add(name_size.next_multiple_of(4)) else {
            break;
        };
        let Some(next) = desc_start
            .checked_add(desc_size.next_multiple_of(4))
            .filter(|next| *next <= end)
        else {
            break;
        };

        if kind == NT_GNU_BUILD_ID && name_size == 4 {
            let mut name = [0u8; 4];
            reader.seek(SeekFrom::Start(name_start))?;
            reader.read_exact(&mut name)?;
            if name == *b"GNU\0" {
                let mut desc = vec![0u8; usize::try_from(desc_size).map_err(io::Error::other)?];
                reader.seek(SeekFrom::Start(desc_start))?;
                reader.read_exact(&mut desc)?;
                return Ok(Some(desc));
            }
        }
        position = next;
    }

    Ok(None)
}

fn read_array_at<R: Read + Seek, const N: usize>(reader: &mut R, offset: u64) -> io::Result<[u8; N]> {
    let mut buffer = [0u8; N];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

fn read_u16_at<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<u16> {
    read_array_at(reader, offset).map(u16::from_le_bytes)
}

fn read_u32_at<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<u32> {
    read_array_at(reader, offset).map(u32::from_le_bytes)
}

fn read_u64_at<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<u64> {
    read_array_at(reader, offset).map(u64::from_le_bytes)
}
