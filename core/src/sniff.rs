//! Container-format probing for reconstructed payloads.
//!
//! Only the outer container headers are parsed, enough to classify the
//! payload and read its declared dimensions; actual pixel decoding is the
//! presentation side's problem.

/// Recognized still-image containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Webp => "WebP",
        }
    }
}

/// Classification result with the container's declared dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Classify a payload by its leading bytes and read the declared
/// dimensions. Returns `None` for anything unrecognized or with a
/// malformed container header.
pub fn probe(data: &[u8]) -> Option<ImageInfo> {
    probe_png(data)
        .or_else(|| probe_jpeg(data))
        .or_else(|| probe_webp(data))
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn probe_png(data: &[u8]) -> Option<ImageInfo> {
    if data.len() < 24 || data[..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some(ImageInfo {
        format: ImageFormat::Png,
        width,
        height,
    })
}

fn probe_jpeg(data: &[u8]) -> Option<ImageInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    // Walk the marker segments until a start-of-frame carries dimensions.
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        // Fill bytes before a marker are legal.
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        if pos >= data.len() {
            return None;
        }
        let marker = data[pos];
        pos += 1;
        match marker {
            // Standalone markers without a length field.
            0xD0..=0xD9 | 0x01 => continue,
            // SOF0..SOF15 except DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if pos + 7 > data.len() {
                    return None;
                }
                let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
                let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
                return Some(ImageInfo {
                    format: ImageFormat::Jpeg,
                    width,
                    height,
                });
            }
            // Scan data follows; dimensions must have appeared before it.
            0xDA => return None,
            _ => {
                if pos + 2 > data.len() {
                    return None;
                }
                let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                if length < 2 {
                    return None;
                }
                pos += length;
            }
        }
    }
    None
}

fn probe_webp(data: &[u8]) -> Option<ImageInfo> {
    if data.len() < 30 || &data[..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return None;
    }
    let chunk = &data[12..16];
    let payload = &data[20..];
    match chunk {
        b"VP8 " => {
            // Key frame: 3-byte frame tag, then the 9D 01 2A sync code.
            if payload.len() < 10 || payload[3..6] != [0x9D, 0x01, 0x2A] {
                return None;
            }
            let width = (u16::from_le_bytes([payload[6], payload[7]]) & 0x3FFF) as u32;
            let height = (u16::from_le_bytes([payload[8], payload[9]]) & 0x3FFF) as u32;
            Some(ImageInfo {
                format: ImageFormat::Webp,
                width,
                height,
            })
        }
        b"VP8L" => {
            if payload.len() < 5 || payload[0] != 0x2F {
                return None;
            }
            let bits =
                u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
            Some(ImageInfo {
                format: ImageFormat::Webp,
                width: (bits & 0x3FFF) + 1,
                height: ((bits >> 14) & 0x3FFF) + 1,
            })
        }
        b"VP8X" => {
            if payload.len() < 10 {
                return None;
            }
            let width =
                u32::from_le_bytes([payload[4], payload[5], payload[6], 0]) + 1;
            let height =
                u32::from_le_bytes([payload[7], payload[8], payload[9], 0]) + 1;
            Some(ImageInfo {
                format: ImageFormat::Webp,
                width,
                height,
            })
        }
        _ => None,
    }
}
