// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Content-type sniffing from leading bytes.
//!
//! Pure functions over a byte prefix. Only the first [`SNIFF_LEN`] bytes are
//! ever looked at; client-declared MIME types and filenames play no part.

/// Number of leading bytes inspected.
pub const SNIFF_LEN: usize = 512;

/// Image formats the relay accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Webp => ".webp",
        }
    }
}

/// Outcome of sniffing a byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    /// One of the accepted image formats
    Image(ImageKind),
    /// Anything else, labelled with the detected MIME type
    Other(&'static str),
}

impl Sniffed {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Image(kind) => kind.mime_type(),
            Self::Other(label) => label,
        }
    }
}

/// Exact prefix signatures, checked in order.
const SIGNATURES: &[(&[u8], Sniffed)] = &[
    (b"\xFF\xD8\xFF", Sniffed::Image(ImageKind::Jpeg)),
    (b"\x89PNG\r\n\x1A\n", Sniffed::Image(ImageKind::Png)),
    (b"GIF87a", Sniffed::Other("image/gif")),
    (b"GIF89a", Sniffed::Other("image/gif")),
    (b"%PDF-", Sniffed::Other("application/pdf")),
    (b"PK\x03\x04", Sniffed::Other("application/zip")),
    (b"BM", Sniffed::Other("image/bmp")),
];

/// Classify a byte prefix.
pub fn sniff(data: &[u8]) -> Sniffed {
    let head = &data[..data.len().min(SNIFF_LEN)];

    if is_webp(head) {
        return Sniffed::Image(ImageKind::Webp);
    }

    for (signature, sniffed) in SIGNATURES {
        if head.starts_with(signature) {
            return *sniffed;
        }
    }

    if head.iter().any(|&b| is_binary_byte(b)) {
        Sniffed::Other("application/octet-stream")
    } else {
        Sniffed::Other("text/plain; charset=utf-8")
    }
}

/// `RIFF`, four length bytes, then `WEBPVP`.
fn is_webp(head: &[u8]) -> bool {
    head.len() >= 14 && &head[..4] == b"RIFF" && &head[8..14] == b"WEBPVP"
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
