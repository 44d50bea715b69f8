//! Guessing the MIME type of files in inexpensive ways.

/// Takes a guess at a file's MIME type using its file extension.
///
/// The extension is the sequence of bytes after the last period, so we can't
/// ascribe unique MIME types to things like `.tar.gz`.
pub fn from_path(file_path: &[u8]) -> &'static [u8] {
    file_path
        .rsplitn(2, |b| *b == b'.')
        .next()
        .map(canned_mapping)
        .unwrap_or(b"text/plain")
}

fn canned_mapping(ext: &[u8]) -> &'static [u8] {
    match ext {
        b"html" | b"htm" => b"text/html",
        b"css" => b"text/css",
        b"js" => b"text/javascript",
        b"json" => b"application/json",
        b"txt" => b"text/plain",
        b"gif" => b"image/gif",
        b"jpeg" | b"jpg" => b"image/jpeg",
        b"png" => b"image/png",
        b"svg" => b"image/svg+xml",
        b"ico" => b"image/x-icon",
        b"pdf" => b"application/pdf",
        b"wasm" => b"application/wasm",
        _ => b"text/plain",
    }
}
