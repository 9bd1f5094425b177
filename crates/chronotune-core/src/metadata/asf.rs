use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::{EmbeddedTags, MetadataError, fill};

const HEADER: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const CONTENT_DESCRIPTION: [u8; 16] = [
    0x33, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const EXTENDED_CONTENT_DESCRIPTION: [u8; 16] = [
    0x40, 0xA4, 0xD0, 0xD2, 0x07, 0xE3, 0xD2, 0x11, 0x97, 0xF0, 0x00, 0xA0, 0xC9, 0x5E, 0xA8, 0x50,
];

const HEADER_PREAMBLE: usize = 30;
const OBJECT_PREAMBLE: usize = 24;
const MAX_HEADER_LEN: u64 = 16 * 1024 * 1024;

/// Reads title, artist, album and year attributes from an ASF (WMA) header.
pub(super) fn read_tags(path: &Path) -> Result<EmbeddedTags, MetadataError> {
    let unreadable = |reason: String| MetadataError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = File::open(path).map_err(|err| unreadable(err.to_string()))?;
    let mut preamble = [0u8; HEADER_PREAMBLE];
    file.read_exact(&mut preamble)
        .map_err(|_| unreadable("file too short for an ASF header".into()))?;
    if preamble[..16] != HEADER {
        return Err(unreadable("missing ASF header object".into()));
    }

    let mut cursor = Cursor::new(&preamble[16..]);
    let header_len = cursor.u64().unwrap_or(0);
    let object_count = cursor.u32().unwrap_or(0);
    if header_len < HEADER_PREAMBLE as u64 || header_len > MAX_HEADER_LEN {
        return Err(unreadable(format!("implausible ASF header size {header_len}")));
    }

    let mut body = vec![0u8; header_len as usize - HEADER_PREAMBLE];
    file.read_exact(&mut body)
        .map_err(|_| unreadable("truncated ASF header".into()))?;

    parse_header_objects(&body, object_count)
        .ok_or_else(|| unreadable("malformed ASF header object".into()))
}

fn parse_header_objects(body: &[u8], object_count: u32) -> Option<EmbeddedTags> {
    let mut tags = EmbeddedTags::default();
    let mut cursor = Cursor::new(body);

    for _ in 0..object_count {
        if cursor.remaining() == 0 {
            break;
        }
        let guid = cursor.take(16)?;
        let size = usize::try_from(cursor.u64()?).ok()?;
        let payload = cursor.take(size.checked_sub(OBJECT_PREAMBLE)?)?;

        if guid == CONTENT_DESCRIPTION {
            content_description(payload, &mut tags)?;
        } else if guid == EXTENDED_CONTENT_DESCRIPTION {
            extended_content_description(payload, &mut tags)?;
        }
    }
    Some(tags)
}

fn content_description(payload: &[u8], tags: &mut EmbeddedTags) -> Option<()> {
    let mut cursor = Cursor::new(payload);
    let title_len = cursor.u16()? as usize;
    let author_len = cursor.u16()? as usize;
    // remaining length fields
    cursor.take(6)?;

    fill(&mut tags.title, utf16(cursor.take(title_len)?));
    fill(&mut tags.artist, utf16(cursor.take(author_len)?));
    Some(())
}

fn extended_content_description(payload: &[u8], tags: &mut EmbeddedTags) -> Option<()> {
    let mut cursor = Cursor::new(payload);
    let count = cursor.u16()?;

    for _ in 0..count {
        let name_len = cursor.u16()? as usize;
        let name = utf16(cursor.take(name_len)?).unwrap_or_default();
        let value_type = cursor.u16()?;
        let value_len = cursor.u16()? as usize;
        let raw = cursor.take(value_len)?;

        let value = match value_type {
            0 => utf16(raw),
            3 => Cursor::new(raw).u32().map(|v| v.to_string()),
            4 => Cursor::new(raw).u64().map(|v| v.to_string()),
            5 => Cursor::new(raw).u16().map(|v| v.to_string()),
            _ => None,
        };

        let slot = match name.to_ascii_lowercase().as_str() {
            "wm/originalreleaseyear" | "wm/originalreleasetime" => &mut tags.original_release,
            "wm/year" => &mut tags.year,
            "wm/albumtitle" => &mut tags.album,
            "wm/albumartist" => &mut tags.artist,
            "title" => &mut tags.title,
            "author" => &mut tags.artist,
            _ => continue,
        };
        fill(slot, value);
    }
    Some(())
}

fn utf16(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);
    let text = text.trim_end_matches('\0');
    (!text.is_empty()).then(|| text.to_owned())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2)?.try_into().ok().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_le_bytes)
    }
}
