//! Fixed-size byte arrays as unpadded URL-safe base64 strings.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serializer};

pub fn encode<const N: usize>(binary: &[u8; N], out: &mut String) {
    URL_SAFE_NO_PAD.encode_string(binary, out);
}

/// `None` unless `text` is exactly the encoding of `N` bytes.
pub fn decode<const N: usize>(text: &str) -> Option<[u8; N]> {
    if text.len() != base64::encoded_len(N, false)? {
        return None;
    }
    let mut buf = [0u8; N];
    // exact length was checked above, the checked variant would reject it as too small
    URL_SAFE_NO_PAD.decode_slice_unchecked(text, &mut buf).ok()?;
    Some(buf)
}

pub fn serialize<S: Serializer, const N: usize>(binary: &[u8; N], serializer: S) -> Result<S::Ok, S::Error> {
    let mut out = String::new();
    encode(binary, &mut out);
    serializer.serialize_str(&out)
}

pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error> {
    use serde::de::Error;

    let text = String::deserialize(deserializer)?;
    decode(&text).ok_or_else(|| D::Error::custom(format_args!("expected base64 of {N} bytes")))
}

#[test]
fn exact_lengths_only() {
    let mut out = String::new();
    encode(&[7u8; 18], &mut out);
    assert_eq!(out.len(), 24);
    assert_eq!(decode::<18>(&out), Some([7u8; 18]));
    assert_eq!(decode::<17>(&out), None);
    out.push('A');
    assert_eq!(decode::<18>(&out), None);
    assert_eq!(decode::<18>("!!!!!!!!!!!!!!!!!!!!!!!!"), None);
}
