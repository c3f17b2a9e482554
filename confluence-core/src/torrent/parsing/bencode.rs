//! Bencode parsing and encoding for metainfo files

use std::collections::HashMap;
use std::ops::Range;

use bytes::Bytes;

use super::types::MetaInfo;
use crate::torrent::TorrentError;

type BencodeDict<'a> = HashMap<&'a [u8], bencode_rs::Value<'a>>;
type ParseResult<T> = Result<T, TorrentError>;

/// Bencode utilities for metainfo extraction and encoding.
pub struct BencodeParser;

impl BencodeParser {
    /// Parses a bencoded metainfo file, keeping the raw `info` bytes.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidTorrentFile` - If bencode parsing failed or `info` is missing
    pub fn parse_metainfo(data: &[u8]) -> ParseResult<MetaInfo> {
        let parsed = bencode_rs::Value::parse(data)
            .map_err(|e| invalid(format!("Bencode parsing failed: {e:?}")))?;

        let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
            return Err(invalid("Root element must be dictionary"));
        };

        match dict.get(b"info".as_slice()) {
            Some(bencode_rs::Value::Dictionary(_)) => {}
            Some(_) => return Err(invalid("Info field must be dictionary")),
            None => return Err(invalid("Missing 'info' field")),
        }

        let info_span = Self::top_level_span(data, b"info")?
            .ok_or_else(|| invalid("Could not find info dictionary in data"))?;

        let mut metainfo = MetaInfo::from_parts(Bytes::copy_from_slice(&data[info_span]));
        metainfo.announce = Self::string_field(dict, b"announce");
        metainfo.announce_list = Self::announce_list(dict);
        metainfo.comment = Self::string_field(dict, b"comment");
        metainfo.created_by = Self::string_field(dict, b"created by");
        metainfo.creation_date = match dict.get(b"creation date".as_slice()) {
            Some(bencode_rs::Value::Integer(value)) => Some(*value),
            _ => None,
        };
        metainfo.url_list = Self::url_list(dict);

        Ok(metainfo)
    }

    /// Checks that `data` is exactly one bencoded dictionary.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidTorrentFile` - If the bytes are not a complete dictionary
    pub fn validate_info_dictionary(data: &[u8]) -> ParseResult<()> {
        if data.first() != Some(&b'd') {
            return Err(invalid("Expected dictionary start"));
        }
        let end = Self::value_end(data, 0)?;
        if end != data.len() {
            return Err(invalid("Trailing data after info dictionary"));
        }
        Ok(())
    }

    /// Reads the `name` entry of an info dictionary.
    pub fn info_name(info_bytes: &[u8]) -> Option<String> {
        let parsed = bencode_rs::Value::parse(info_bytes).ok()?;
        let bencode_rs::Value::Dictionary(dict) = parsed.first()? else {
            return None;
        };
        Self::string_field(dict, b"name")
    }

    /// Encodes a metainfo file with keys in sorted order and `info` copied verbatim.
    pub fn encode_metainfo(metainfo: &MetaInfo) -> Vec<u8> {
        let mut out = Vec::with_capacity(metainfo.info_bytes().len() + 256);
        out.push(b'd');

        if let Some(announce) = &metainfo.announce {
            put_bytes(&mut out, b"announce");
            put_bytes(&mut out, announce.as_bytes());
        }
        if !metainfo.announce_list.is_empty() {
            put_bytes(&mut out, b"announce-list");
            out.push(b'l');
            for tier in &metainfo.announce_list {
                put_string_list(&mut out, tier);
            }
            out.push(b'e');
        }
        if let Some(comment) = &metainfo.comment {
            put_bytes(&mut out, b"comment");
            put_bytes(&mut out, comment.as_bytes());
        }
        if let Some(created_by) = &metainfo.created_by {
            put_bytes(&mut out, b"created by");
            put_bytes(&mut out, created_by.as_bytes());
        }
        if let Some(creation_date) = metainfo.creation_date {
            put_bytes(&mut out, b"creation date");
            out.push(b'i');
            out.extend_from_slice(creation_date.to_string().as_bytes());
            out.push(b'e');
        }

        put_bytes(&mut out, b"info");
        out.extend_from_slice(metainfo.info_bytes());

        if !metainfo.url_list.is_empty() {
            put_bytes(&mut out, b"url-list");
            put_string_list(&mut out, &metainfo.url_list);
        }

        out.push(b'e');
        out
    }

    /// Locates the raw value bytes for `key` in the top-level dictionary.
    fn top_level_span(data: &[u8], key: &[u8]) -> ParseResult<Option<Range<usize>>> {
        if data.first() != Some(&b'd') {
            return Err(invalid("Expected dictionary start"));
        }

        let mut pos = 1;
        while pos < data.len() && data[pos] != b'e' {
            let (key_range, value_start) = Self::read_string(data, pos)?;
            let value_end = Self::value_end(data, value_start)?;
            if &data[key_range] == key {
                return Ok(Some(value_start..value_end));
            }
            pos = value_end;
        }

        Ok(None)
    }

    /// Reads a length-prefixed string at `pos`, returning its content range and the next position.
    fn read_string(data: &[u8], pos: usize) -> ParseResult<(Range<usize>, usize)> {
        let colon = data[pos..]
            .iter()
            .position(|&b| b == b':')
            .map(|offset| pos + offset)
            .ok_or_else(|| invalid("Invalid string format"))?;

        let length: usize = std::str::from_utf8(&data[pos..colon])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| invalid("Invalid string length"))?;

        let start = colon + 1;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| invalid("String runs past end of data"))?;

        Ok((start..end, end))
    }

    /// Finds the end position of the bencode value starting at `start`.
    fn value_end(data: &[u8], start: usize) -> ParseResult<usize> {
        let mut pos = start;
        let mut depth = 0usize;

        loop {
            match data.get(pos) {
                Some(b'd' | b'l') => {
                    depth += 1;
                    pos += 1;
                }
                Some(b'e') if depth > 0 => {
                    depth -= 1;
                    pos += 1;
                }
                Some(b'i') => {
                    let end = data[pos..]
                        .iter()
                        .position(|&b| b == b'e')
                        .ok_or_else(|| invalid("Unterminated integer"))?;
                    pos += end + 1;
                }
                Some(b'0'..=b'9') => {
                    pos = Self::read_string(data, pos)?.1;
                }
                Some(_) => return Err(invalid("Invalid bencode character")),
                None => return Err(invalid("Incomplete bencode value")),
            }

            if depth == 0 {
                return Ok(pos);
            }
        }
    }

    fn string_field(dict: &BencodeDict<'_>, key: &[u8]) -> Option<String> {
        match dict.get(key) {
            Some(bencode_rs::Value::Bytes(bytes)) => String::from_utf8(bytes.to_vec()).ok(),
            _ => None,
        }
    }

    fn announce_list(dict: &BencodeDict<'_>) -> Vec<Vec<String>> {
        let Some(bencode_rs::Value::List(tiers)) = dict.get(b"announce-list".as_slice()) else {
            return Vec::new();
        };

        tiers
            .iter()
            .filter_map(|tier| match tier {
                bencode_rs::Value::List(urls) => Some(string_list(urls)),
                _ => None,
            })
            .filter(|tier| !tier.is_empty())
            .collect()
    }

    fn url_list(dict: &BencodeDict<'_>) -> Vec<String> {
        match dict.get(b"url-list".as_slice()) {
            Some(bencode_rs::Value::List(urls)) => string_list(urls),
            Some(bencode_rs::Value::Bytes(url)) if !url.is_empty() => {
                String::from_utf8(url.to_vec()).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

fn string_list(values: &[bencode_rs::Value<'_>]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| match value {
            bencode_rs::Value::Bytes(bytes) => String::from_utf8(bytes.to_vec()).ok(),
            _ => None,
        })
        .collect()
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn put_string_list(out: &mut Vec<u8>, items: &[String]) {
    out.push(b'l');
    for item in items {
        put_bytes(out, item.as_bytes());
    }
    out.push(b'e');
}

fn invalid(reason: impl Into<String>) -> TorrentError {
    TorrentError::InvalidTorrentFile {
        reason: reason.into(),
    }
}
