//! Minimal torrent metainfo inspection.

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use crate::{Error, Result};

/// Extensions counted as playable media files.
const MEDIA_EXTENSIONS: &[&str] = &[
    "3g2", "3gp", "3gp2", "3gpp", "avi", "dat", "drv", "f4v", "flv", "gtp", "h264", "m4v", "mkv",
    "mod", "moov", "mov", "mp4", "mpeg", "mpg", "mts", "rmvb", "spl", "stl", "ts", "vcd", "vid",
    "vob", "webm", "wmv", "yuv",
];

fn decode_info(data: &[u8]) -> Result<Value> {
    let root: Value = serde_bencode::from_bytes(data)?;
    let Value::Dict(mut root) = root else {
        return Err(Error::validation("torrent root is not a dictionary"));
    };
    root.remove(b"info".as_slice())
        .ok_or_else(|| Error::validation("torrent has no info dictionary"))
}

fn is_media_path(path: &Value) -> bool {
    let Value::List(parts) = path else {
        return false;
    };
    let Some(Value::Bytes(name)) = parts.last() else {
        return false;
    };
    let name = String::from_utf8_lossy(name);
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Number of media files in the torrent.
///
/// Single-file torrents count as one file. Multi-file torrents count only
/// entries with a media extension.
pub fn media_file_count(data: &[u8]) -> Result<u32> {
    let Value::Dict(info) = decode_info(data)? else {
        return Err(Error::validation("torrent info is not a dictionary"));
    };

    if let Some(Value::List(files)) = info.get(b"files".as_slice()) {
        let count = files
            .iter()
            .filter(|file| match file {
                Value::Dict(file) => file.get(b"path".as_slice()).is_some_and(is_media_path),
                _ => false,
            })
            .count();
        return Ok(count as u32);
    }

    if info.contains_key(b"name".as_slice()) {
        return Ok(1);
    }
    Ok(0)
}

/// Hex SHA-1 of the bencoded info dictionary.
pub fn info_hash(data: &[u8]) -> Result<String> {
    let info = decode_info(data)?;
    let encoded = serde_bencode::to_bytes(&info)?;
    Ok(hex::encode(Sha1::digest(&encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &[u8] = b"d8:announce9:http://x/4:infod6:lengthi10e4:name5:a.mkv12:piece lengthi16384e6:pieces0:ee";
    const MULTI: &[u8] = b"d4:infod5:filesld6:lengthi1e4:pathl6:e1.mkveed6:lengthi1e4:pathl3:sub5:e.srteed6:lengthi1e4:pathl6:e2.MP4eee4:name4:dark12:piece lengthi16384e6:pieces0:ee";

    #[test]
    fn test_media_file_count() {
        assert_eq!(media_file_count(SINGLE).unwrap(), 1);
        assert_eq!(media_file_count(MULTI).unwrap(), 2);
        assert!(media_file_count(b"not bencode").is_err());
        assert!(media_file_count(b"d3:fooi1ee").is_err());
    }

    #[test]
    fn test_info_hash_of_info_dict() {
        let info: &[u8] = b"d6:lengthi10e4:name5:a.mkv12:piece lengthi16384e6:pieces0:e";
        let expected = hex::encode(Sha1::digest(info));
        assert_eq!(info_hash(SINGLE).unwrap(), expected);
        assert_eq!(info_hash(SINGLE).unwrap().len(), 40);
    }
}
