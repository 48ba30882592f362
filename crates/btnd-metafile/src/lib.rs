#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Metafile codec: bencoded torrent bytes in, contiguous file-layout
//! records out.
//!
//! Paths are raw bytes throughout; the metafile's `info.name` and path
//! segments are joined with `/` without any text decoding, and dict keys
//! are compared as byte strings.

use std::collections::HashMap;

use btnd_model::FileInfo;
use serde_bencode::value::Value;
use thiserror::Error;

/// Result alias for codec operations.
pub type MetafileResult<T> = Result<T, MetafileError>;

/// Errors raised while decoding a metafile.
#[derive(Debug, Error)]
pub enum MetafileError {
    /// The bytes are not well-formed bencode.
    #[error("metafile is not valid bencode")]
    Malformed {
        /// Source decoder error.
        source: serde_bencode::Error,
    },
    /// The bencode parsed but a required field is missing or mistyped.
    #[error("metafile is missing or mistypes `{field}`")]
    Shape {
        /// Dotted path of the offending field.
        field: &'static str,
    },
    /// A file length was negative.
    #[error("metafile declares a negative length at file {index}")]
    NegativeLength {
        /// Index of the offending file entry.
        index: i64,
    },
}

/// Decode the file layout of a metafile.
///
/// Single-file mode (no `info.files`) yields one record covering
/// `[0, info.length)` at `info.name`. Multi-file mode walks
/// `info.files` in order, joining `info.name` with each entry's path
/// segments and accumulating half-open byte ranges, so the returned
/// records partition the payload: the first starts at zero and each
/// subsequent record starts where the previous one stopped.
///
/// # Errors
///
/// Returns an error when the bytes are not bencode, the expected
/// dictionary shape is missing, or a declared length is negative.
pub fn parse_file_layout(raw: &[u8]) -> MetafileResult<Vec<FileInfo>> {
    let value: Value =
        serde_bencode::from_bytes(raw).map_err(|source| MetafileError::Malformed { source })?;
    let root = as_dict(&value, "metafile")?;
    let info = as_dict(field(root, b"info", "info")?, "info")?;
    let name = as_bytes(field(info, b"name", "info.name")?, "info.name")?;

    let Some(files) = info.get(b"files".as_slice()) else {
        let length = as_int(field(info, b"length", "info.length")?, "info.length")?;
        if length < 0 {
            return Err(MetafileError::NegativeLength { index: 0 });
        }
        return Ok(vec![FileInfo {
            index: 0,
            path: name.to_vec(),
            start: 0,
            stop: length,
        }]);
    };

    let entries = as_list(files, "info.files")?;
    let mut layout = Vec::with_capacity(entries.len());
    let mut offset = 0_i64;
    for (index, entry) in entries.iter().enumerate() {
        let index = index as i64;
        let entry = as_dict(entry, "info.files[]")?;
        let length = as_int(
            field(entry, b"length", "info.files[].length")?,
            "info.files[].length",
        )?;
        if length < 0 {
            return Err(MetafileError::NegativeLength { index });
        }
        let segments = as_list(
            field(entry, b"path", "info.files[].path")?,
            "info.files[].path",
        )?;
        let mut path = name.to_vec();
        for segment in segments {
            path.push(b'/');
            path.extend_from_slice(as_bytes(segment, "info.files[].path[]")?);
        }
        layout.push(FileInfo {
            index,
            path,
            start: offset,
            stop: offset + length,
        });
        offset += length;
    }
    Ok(layout)
}

/// Total payload size covered by a layout.
#[must_use]
pub fn layout_size(layout: &[FileInfo]) -> i64 {
    layout.last().map_or(0, |file| file.stop)
}

fn field<'v>(
    dict: &'v HashMap<Vec<u8>, Value>,
    key: &[u8],
    name: &'static str,
) -> MetafileResult<&'v Value> {
    dict.get(key).ok_or(MetafileError::Shape { field: name })
}

fn as_dict<'v>(
    value: &'v Value,
    name: &'static str,
) -> MetafileResult<&'v HashMap<Vec<u8>, Value>> {
    match value {
        Value::Dict(dict) => Ok(dict),
        _ => Err(MetafileError::Shape { field: name }),
    }
}

fn as_list<'v>(value: &'v Value, name: &'static str) -> MetafileResult<&'v Vec<Value>> {
    match value {
        Value::List(list) => Ok(list),
        _ => Err(MetafileError::Shape { field: name }),
    }
}

fn as_bytes<'v>(value: &'v Value, name: &'static str) -> MetafileResult<&'v [u8]> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(MetafileError::Shape { field: name }),
    }
}

fn as_int(value: &Value, name: &'static str) -> MetafileResult<i64> {
    match value {
        Value::Int(int) => Ok(*int),
        _ => Err(MetafileError::Shape { field: name }),
    }
}
