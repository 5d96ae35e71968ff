// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test payload generators.

pub const BOUNDARY: &str = "relay-test-boundary";

/// PNG signature followed by filler, `size` bytes in total.
pub fn png_bytes(size: usize) -> Vec<u8> {
    with_header(b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR", size)
}

/// JPEG/JFIF header followed by filler.
pub fn jpeg_bytes(size: usize) -> Vec<u8> {
    with_header(b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00", size)
}

/// RIFF/WEBP header followed by filler.
pub fn webp_bytes(size: usize) -> Vec<u8> {
    with_header(b"RIFF\x24\x00\x00\x00WEBPVP8 ", size)
}

/// GIF header followed by filler.
pub fn gif_bytes(size: usize) -> Vec<u8> {
    with_header(b"GIF89a\x01\x00\x01\x00", size)
}

fn with_header(header: &[u8], size: usize) -> Vec<u8> {
    let mut data = header.to_vec();
    data.extend((0..size.saturating_sub(header.len())).map(|i| (i % 251) as u8));
    data.truncate(size.max(header.len()));
    data
}

/// One multipart part.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// Encode parts as a `multipart/form-data` body using [`BOUNDARY`].
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
