//! Reader for the compiled (binary XML) `AndroidManifest.xml` found in APKs
//!
//! Only the root `<manifest>` element is decoded: its `package`, `versionName`
//! and `versionCode` attributes.

use crate::errors::AgentError;

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = 0xFFFF_FFFF;

const TYPE_STRING: u8 = 0x03;

const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;

/// Identity fields declared by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    pub package: String,
    pub version_name: Option<String>,
    pub version_code: Option<String>,
}

fn malformed(what: &str) -> AgentError {
    AgentError::ParseError(format!("Malformed binary manifest: {}", what))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, AgentError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed("truncated u16"))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, AgentError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed("truncated u32"))
}

/// Decoded string pool chunk
struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    fn parse(chunk: &[u8]) -> Result<Self, AgentError> {
        let header_size = read_u16(chunk, 2)? as usize;
        let count = read_u32(chunk, 8)? as usize;
        let flags = read_u32(chunk, 16)?;
        let strings_start = read_u32(chunk, 20)? as usize;
        let utf8 = flags & UTF8_FLAG != 0;

        // the offset table and string data must both fit inside the chunk
        let offsets_end = count
            .checked_mul(4)
            .and_then(|len| len.checked_add(header_size))
            .filter(|end| *end <= chunk.len())
            .ok_or_else(|| malformed("string count exceeds pool"))?;
        if strings_start > chunk.len() || (count > 0 && strings_start < offsets_end) {
            return Err(malformed("string data out of bounds"));
        }

        let mut strings = Vec::with_capacity(count);
        for i in 0..count {
            let offset = read_u32(chunk, header_size + i * 4)? as usize;
            let start = strings_start + offset;
            let value = if utf8 {
                decode_utf8(chunk, start)?
            } else {
                decode_utf16(chunk, start)?
            };
            strings.push(value);
        }
        Ok(Self { strings })
    }

    fn get(&self, index: u32) -> Option<&str> {
        if index == NO_INDEX {
            return None;
        }
        self.strings.get(index as usize).map(String::as_str)
    }
}

/// UTF-8 pool entry: char length, byte length (each 1 or 2 bytes), bytes
fn decode_utf8(chunk: &[u8], start: usize) -> Result<String, AgentError> {
    let (_, after_chars) = utf8_length(chunk, start)?;
    let (len, after_bytes) = utf8_length(chunk, after_chars)?;
    let bytes = chunk
        .get(after_bytes..after_bytes + len)
        .ok_or_else(|| malformed("string out of bounds"))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn utf8_length(chunk: &[u8], at: usize) -> Result<(usize, usize), AgentError> {
    let first = *chunk.get(at).ok_or_else(|| malformed("truncated length"))? as usize;
    if first & 0x80 != 0 {
        let second = *chunk
            .get(at + 1)
            .ok_or_else(|| malformed("truncated length"))? as usize;
        Ok((((first & 0x7f) << 8) | second, at + 2))
    } else {
        Ok((first, at + 1))
    }
}

/// UTF-16 pool entry: unit length (1 or 2 u16s), units
fn decode_utf16(chunk: &[u8], start: usize) -> Result<String, AgentError> {
    let first = read_u16(chunk, start)? as usize;
    let (len, data_start) = if first & 0x8000 != 0 {
        let second = read_u16(chunk, start + 2)? as usize;
        (((first & 0x7fff) << 16) | second, start + 4)
    } else {
        (first, start + 2)
    };

    let units = (0..len)
        .map(|i| read_u16(chunk, data_start + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;
    Ok(String::from_utf16_lossy(&units))
}

/// Parse a compiled manifest and return the root element's identity attributes
pub fn parse_manifest(data: &[u8]) -> Result<ManifestInfo, AgentError> {
    if read_u16(data, 0)? != RES_XML_TYPE {
        return Err(malformed("not a binary XML document"));
    }
    let header_size = read_u16(data, 2)? as usize;
    let total = (read_u32(data, 4)? as usize).min(data.len());

    let mut pool: Option<StringPool> = None;
    let mut resource_ids: Vec<u32> = Vec::new();
    let mut offset = header_size;

    while offset + 8 <= total {
        let chunk_type = read_u16(data, offset)?;
        let chunk_size = read_u32(data, offset + 4)? as usize;
        if chunk_size < 8 || offset + chunk_size > total {
            return Err(malformed("bad chunk size"));
        }
        let chunk = &data[offset..offset + chunk_size];

        match chunk_type {
            RES_STRING_POOL_TYPE => pool = Some(StringPool::parse(chunk)?),
            RES_XML_RESOURCE_MAP_TYPE => {
                let chunk_header = read_u16(chunk, 2)? as usize;
                resource_ids = chunk
                    .get(chunk_header..)
                    .unwrap_or(&[])
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
            }
            RES_XML_START_ELEMENT_TYPE => {
                let pool = pool.as_ref().ok_or_else(|| malformed("element before string pool"))?;
                if let Some(info) = read_manifest_element(chunk, pool, &resource_ids)? {
                    return Ok(info);
                }
            }
            _ => {}
        }
        offset += chunk_size;
    }

    Err(AgentError::ParseError(
        "No <manifest> element with a package attribute".to_string(),
    ))
}

fn read_manifest_element(
    chunk: &[u8],
    pool: &StringPool,
    resource_ids: &[u32],
) -> Result<Option<ManifestInfo>, AgentError> {
    let header_size = read_u16(chunk, 2)? as usize;
    let name = read_u32(chunk, header_size + 4)?;
    if pool.get(name) != Some("manifest") {
        return Ok(None);
    }

    let attr_start = read_u16(chunk, header_size + 8)? as usize;
    let attr_size = read_u16(chunk, header_size + 10)? as usize;
    let attr_count = read_u16(chunk, header_size + 12)? as usize;

    let mut package = None;
    let mut version_name = None;
    let mut version_code = None;

    for i in 0..attr_count {
        let at = header_size + attr_start + i * attr_size;
        let name_index = read_u32(chunk, at + 4)?;
        let raw_value = read_u32(chunk, at + 8)?;
        let data_type = *chunk.get(at + 15).ok_or_else(|| malformed("truncated attribute"))?;
        let data = read_u32(chunk, at + 16)?;

        let value = if raw_value != NO_INDEX {
            pool.get(raw_value).map(str::to_string)
        } else {
            match data_type {
                TYPE_STRING => pool.get(data).map(str::to_string),
                // integer types, decimal or hex, are reported in decimal
                _ => Some(data.to_string()),
            }
        };

        let resource_id = resource_ids.get(name_index as usize).copied();
        match (pool.get(name_index), resource_id) {
            (_, Some(ATTR_VERSION_CODE)) | (Some("versionCode"), _) => version_code = value,
            (_, Some(ATTR_VERSION_NAME)) | (Some("versionName"), _) => version_name = value,
            (Some("package"), _) => package = value,
            _ => {}
        }
    }

    Ok(package.map(|package| ManifestInfo {
        package,
        version_name,
        version_code,
    }))
}
