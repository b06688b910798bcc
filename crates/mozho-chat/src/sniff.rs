use mime::Mime;

/// Only the head of an upload is inspected.
const SNIFF_LEN: usize = 512;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/gzip"),
    (b"OggS\x00", "audio/ogg"),
    (b"ID3", "audio/mpeg"),
];

/// Guess the content type of an upload from its leading bytes.
pub fn detect(bytes: &[u8]) -> Mime {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    for (magic, mime) in SIGNATURES {
        if head.starts_with(magic) {
            return parse_or_octet(mime);
        }
    }

    // RIFF containers carry their format at offset 8.
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        match &head[8..12] {
            b"WEBP" => return parse_or_octet("image/webp"),
            b"WAVE" => return parse_or_octet("audio/wav"),
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return parse_or_octet("video/mp4");
    }

    if is_text(head) {
        return mime::TEXT_PLAIN_UTF_8;
    }
    mime::APPLICATION_OCTET_STREAM
}

/// Extension (without the dot) for a sniffed type, used when the uploaded
/// file name carries none.
pub fn extension_for(mime: &Mime) -> Option<&'static str> {
    let ext = match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("image", "png") => "png",
        ("image", "jpeg") => "jpg",
        ("image", "gif") => "gif",
        ("image", "webp") => "webp",
        ("application", "pdf") => "pdf",
        ("application", "zip") => "zip",
        ("application", "gzip") => "gz",
        ("audio", "ogg") => "ogg",
        ("audio", "mpeg") => "mp3",
        ("audio", "wav") => "wav",
        ("video", "mp4") => "mp4",
        ("text", "plain") => "txt",
        _ => return None,
    };
    Some(ext)
}

fn parse_or_octet(s: &str) -> Mime {
    s.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

fn is_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character cut at the sniff boundary is still text.
        Err(e) => e.error_len().is_none() && head.len() == SNIFF_LEN,
    }
}
