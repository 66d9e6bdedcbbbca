//! Base64 image decoding and magic-byte validation.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

/// Accepted leading bytes, as lowercase hex: JPEG, PNG, GIF.
const MAGIC_PREFIXES: &[&str] = &["ffd8", "8950", "4749"];

/// Padding is optional on input.
const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode a base64 payload.
///
/// Tolerates a `data:<mime>;base64,` prefix, embedded whitespace (MIME line
/// wrapping), missing padding and the URL-safe alphabet.
pub fn decode(base64_image: &str) -> Option<Vec<u8>> {
    let payload = match base64_image.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => base64_image,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let engine = if compact.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    engine.decode(compact).ok()
}

/// True if the buffer starts with a known image signature. Only the first
/// four bytes are inspected.
pub fn validate(bytes: &[u8]) -> bool {
    let head: String = bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    MAGIC_PREFIXES.iter().any(|magic| head.starts_with(magic))
}

/// Decode and validate in one step. `None` means the payload is not a
/// JPEG, PNG or GIF in base64 form.
pub fn decode_image(base64_image: &str) -> Option<Vec<u8>> {
    decode(base64_image).filter(|bytes| validate(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[test]
    fn test_accepts_known_signatures() {
        assert!(validate(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(validate(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(validate(b"GIF89a"));
    }

    #[test]
    fn test_rejects_unknown_signatures() {
        assert!(!validate(&[0x00, 0x00, 0x00, 0x00]));
        assert!(!validate(b"%PDF-1.7"));
        assert!(!validate(&[0xFF]));
        assert!(!validate(&[]));
    }

    #[test]
    fn test_two_byte_prefix_is_enough() {
        assert!(validate(&[0x89, 0x50]));
    }

    #[test]
    fn test_malformed_base64_is_invalid() {
        assert!(decode_image("not base64 at all!!").is_none());
        assert!(decode("###").is_none());
        assert!(decode_image("").is_none());
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let url = format!("data:image/png;base64,{}", b64(&[0x89, 0x50, 0x4E, 0x47]));
        assert_eq!(decode_image(&url), Some(vec![0x89, 0x50, 0x4E, 0x47]));
    }

    #[test]
    fn test_decode_image_filters_non_images() {
        assert!(decode_image(&b64(b"hello world")).is_none());
        assert_eq!(decode_image(&b64(b"GIF87a")), Some(b"GIF87a".to_vec()));
    }

    #[test]
    fn test_unpadded_input_decodes() {
        let padded = b64(&[0xFF, 0xD8, 0xFF, 0xE0]);
        assert!(padded.ends_with("=="));
        let unpadded = padded.trim_end_matches('=');
        assert_eq!(decode_image(unpadded), Some(vec![0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn test_url_safe_alphabet_decodes() {
        // Standard form is "/9j/4A==".
        assert_eq!(decode_image("_9j_4A"), Some(vec![0xFF, 0xD8, 0xFF, 0xE0]));
        assert_eq!(decode_image("_9j_4A=="), Some(vec![0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn test_line_wrapped_input_decodes() {
        let bytes: Vec<u8> = [0x89, 0x50, 0x4E, 0x47].iter().copied().chain(0..60).collect();
        let encoded = b64(&bytes);
        let wrapped = format!("{}\r\n{}\n {}", &encoded[..20], &encoded[20..40], &encoded[40..]);
        assert_eq!(decode_image(&wrapped), Some(bytes));
    }
}
