//! VRChat meta-tool layout: one ancillary PNG chunk per field.
//!
//! | chunk  | content                                   |
//! |--------|-------------------------------------------|
//! | `vrCd` | capture time, `yyyyMMddHHmmssfff`         |
//! | `vrCp` | photographer display name                 |
//! | `vrCw` | world name                                |
//! | `vrCu` | one user per chunk, `name` or `name : id` |

use chrono::{NaiveDateTime, TimeDelta};
use std::io::Cursor;
use std::path::Path;

use super::{MetadataError, MetadataReader, MetadataWriter, User, VrcMetadata};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const DATE_CHUNK: [u8; 4] = *b"vrCd";
const PHOTOGRAPHER_CHUNK: [u8; 4] = *b"vrCp";
const WORLD_CHUNK: [u8; 4] = *b"vrCw";
const USER_CHUNK: [u8; 4] = *b"vrCu";
const END_CHUNK: [u8; 4] = *b"IEND";

const DATE_FORMAT: &str = "%Y%m%d%H%M%S";
const TWITTER_SEPARATOR: &str = " : ";

#[derive(Debug, Clone, Copy, Default)]
pub struct PngChunkCodec;

impl PngChunkCodec {
    pub fn new() -> Self {
        Self
    }

    /// Parse metadata out of an in-memory PNG.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<Option<VrcMetadata>, MetadataError> {
        let mut metadata = VrcMetadata::default();
        let mut found = false;

        for (kind, data) in chunk_frames(bytes)? {
            match kind {
                DATE_CHUNK => {
                    found = true;
                    metadata.taken_at = parse_date(text(data)?);
                }
                PHOTOGRAPHER_CHUNK => {
                    found = true;
                    metadata.photographer = Some(text(data)?.to_string());
                }
                WORLD_CHUNK => {
                    found = true;
                    metadata.world = Some(text(data)?.to_string());
                }
                USER_CHUNK => {
                    found = true;
                    metadata.users.push(parse_user(text(data)?));
                }
                _ => {}
            }
        }

        Ok(found.then_some(metadata))
    }
}

impl MetadataReader for PngChunkCodec {
    fn read(&self, path: &Path) -> Result<Option<VrcMetadata>, MetadataError> {
        let bytes = std::fs::read(path)?;
        self.read_bytes(&bytes)
    }
}

impl MetadataWriter for PngChunkCodec {
    /// Re-encodes the pixels with the metadata chunks placed before the image data.
    /// Ancillary chunks of the input are not carried over.
    fn write(&self, image: &[u8], metadata: &VrcMetadata) -> Result<Vec<u8>, MetadataError> {
        if !image.starts_with(&PNG_SIGNATURE) {
            return Err(MetadataError::NotPng);
        }

        let mut decoder = png::Decoder::new(Cursor::new(image));
        decoder.set_transformations(png::Transformations::EXPAND);
        let mut reader = decoder.read_info()?;

        let mut pixels = vec![0; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut pixels)?;
        pixels.truncate(frame.buffer_size());
        let (color, depth) = reader.output_color_type();

        let mut out = Vec::with_capacity(image.len());
        {
            let mut encoder = png::Encoder::new(&mut out, frame.width, frame.height);
            encoder.set_color(color);
            encoder.set_depth(depth);
            let mut writer = encoder.write_header()?;

            for (kind, data) in encode_chunks(metadata) {
                writer.write_chunk(png::chunk::ChunkType(kind), data.as_bytes())?;
            }

            writer.write_image_data(&pixels)?;
            writer.finish()?;
        }

        Ok(out)
    }
}

/// Walk the chunk frames of a PNG up to and including `IEND`. CRCs are not verified.
fn chunk_frames(bytes: &[u8]) -> Result<Vec<([u8; 4], &[u8])>, MetadataError> {
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return Err(MetadataError::NotPng);
    }

    let mut chunks = Vec::new();
    let mut offset = PNG_SIGNATURE.len();

    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + 8)
            .ok_or(MetadataError::Truncated(offset))?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        let data_start = offset + 8;
        let data_end = data_start
            .checked_add(length)
            .ok_or(MetadataError::Truncated(offset))?;
        let data = bytes
            .get(data_start..data_end)
            .ok_or(MetadataError::Truncated(offset))?;

        // 4-byte CRC trails the data
        let next = data_end + 4;
        if next > bytes.len() {
            return Err(MetadataError::Truncated(offset));
        }

        chunks.push((kind, data));
        offset = next;

        if kind == END_CHUNK {
            break;
        }
    }

    Ok(chunks)
}

fn encode_chunks(metadata: &VrcMetadata) -> Vec<([u8; 4], String)> {
    let mut chunks = Vec::new();

    if let Some(taken_at) = metadata.taken_at {
        chunks.push((DATE_CHUNK, taken_at.format("%Y%m%d%H%M%S%3f").to_string()));
    }
    if let Some(ref photographer) = metadata.photographer {
        chunks.push((PHOTOGRAPHER_CHUNK, photographer.clone()));
    }
    if let Some(ref world) = metadata.world {
        chunks.push((WORLD_CHUNK, world.clone()));
    }
    for user in &metadata.users {
        let value = match user.twitter {
            Some(ref twitter) => format!("{}{}{}", user.name, TWITTER_SEPARATOR, twitter),
            None => user.name.clone(),
        };
        chunks.push((USER_CHUNK, value));
    }

    chunks
}

fn text(data: &[u8]) -> Result<&str, MetadataError> {
    std::str::from_utf8(data).map_err(|e| MetadataError::Text(e.to_string()))
}

fn parse_user(value: &str) -> User {
    match value.split_once(TWITTER_SEPARATOR) {
        Some((name, twitter)) if !twitter.is_empty() => User {
            name: name.to_string(),
            twitter: Some(twitter.to_string()),
        },
        Some((name, _)) => User::new(name),
        None => User::new(value),
    }
}

/// `yyyyMMddHHmmss` with an optional trailing millisecond field.
fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let seconds = value.get(..14)?;
    let base = NaiveDateTime::parse_from_str(seconds, DATE_FORMAT).ok()?;

    match value.get(14..) {
        Some(millis) if !millis.is_empty() => {
            let millis: i64 = millis.parse().ok()?;
            base.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
        }
        _ => Some(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn png_with_chunks(chunks: &[([u8; 4], &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, 2, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            for (kind, data) in chunks {
                writer
                    .write_chunk(png::chunk::ChunkType(*kind), data.as_bytes())
                    .unwrap();
            }
            writer.write_image_data(&[10, 20, 30, 40, 50, 60]).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_read_meta_tool_chunks() {
        let bytes = png_with_chunks(&[
            (DATE_CHUNK, "20200314152653123"),
            (PHOTOGRAPHER_CHUNK, "gatosyocora"),
            (WORLD_CHUNK, "The Black Cat"),
            (USER_CHUNK, "alice : alice_vr"),
            (USER_CHUNK, "bob"),
        ]);

        let meta = PngChunkCodec::new().read_bytes(&bytes).unwrap().unwrap();

        assert_eq!(meta.world.as_deref(), Some("The Black Cat"));
        assert_eq!(meta.photographer.as_deref(), Some("gatosyocora"));
        assert_eq!(meta.users.len(), 2);
        assert_eq!(meta.users[0].name, "alice");
        assert_eq!(meta.users[0].twitter.as_deref(), Some("alice_vr"));
        assert_eq!(meta.users[1], User::new("bob"));

        let expected = NaiveDate::from_ymd_opt(2020, 3, 14)
            .unwrap()
            .and_hms_milli_opt(15, 26, 53, 123)
            .unwrap();
        assert_eq!(meta.taken_at, Some(expected));
    }

    #[test]
    fn test_plain_png_has_no_metadata() {
        let bytes = png_with_chunks(&[]);
        assert_eq!(PngChunkCodec::new().read_bytes(&bytes).unwrap(), None);
    }

    #[test]
    fn test_rejects_non_png() {
        let result = PngChunkCodec::new().read_bytes(b"GIF89a not a png");
        assert!(matches!(result, Err(MetadataError::NotPng)));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut bytes = png_with_chunks(&[(WORLD_CHUNK, "somewhere")]);
        bytes.truncate(30);
        let result = PngChunkCodec::new().read_bytes(&bytes);
        assert!(matches!(result, Err(MetadataError::Truncated(_))));
    }

    #[test]
    fn test_write_replaces_metadata_and_keeps_pixels() {
        let codec = PngChunkCodec::new();
        let original = png_with_chunks(&[(WORLD_CHUNK, "old world"), (USER_CHUNK, "old user")]);

        let mut meta = VrcMetadata::with_users(["carol", "dave"]);
        meta.world = Some("new world".to_string());
        meta.users[1].twitter = Some("dave_tw".to_string());

        let written = codec.write(&original, &meta).unwrap();
        let reread = codec.read_bytes(&written).unwrap().unwrap();
        assert_eq!(reread, meta);

        let before = image::load_from_memory(&original).unwrap().to_rgb8();
        let after = image::load_from_memory(&written).unwrap().to_rgb8();
        assert_eq!(before.as_raw(), after.as_raw());
    }

    #[test]
    fn test_parse_date_without_millis() {
        let parsed = parse_date("20211231235959").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-12-31 23:59:59");
        assert_eq!(parse_date("garbage"), None);
    }
}
