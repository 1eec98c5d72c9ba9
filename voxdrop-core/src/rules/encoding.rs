//! Companion text decoding.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoding a rule declares for its companion text file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8, a leading BOM is skipped.
    #[serde(rename = "utf8")]
    Utf8,
    #[serde(rename = "sjis")]
    ShiftJis,
    /// UTF-16 little endian unless a BOM says otherwise.
    #[serde(rename = "utf16le")]
    Utf16Le,
    /// UTF-16 big endian unless a BOM says otherwise.
    #[serde(rename = "utf16be")]
    Utf16Be,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::ShiftJis,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16Be,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::ShiftJis => "sjis",
            TextEncoding::Utf16Le => "utf16le",
            TextEncoding::Utf16Be => "utf16be",
        }
    }

    fn slot(self) -> usize {
        match self {
            TextEncoding::Utf8 => 0,
            TextEncoding::ShiftJis => 1,
            TextEncoding::Utf16Le => 2,
            TextEncoding::Utf16Be => 3,
        }
    }

    /// Decode raw companion bytes.
    pub fn decode(self, raw: &[u8]) -> Result<String, DecodeError> {
        match self {
            TextEncoding::Utf8 => {
                let body = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
                Ok(UTF_8.decode_without_bom_handling(body).0.into_owned())
            }
            TextEncoding::ShiftJis => strict(SHIFT_JIS, raw, self),
            TextEncoding::Utf16Le => decode_utf16(raw, UTF_16LE, self),
            TextEncoding::Utf16Be => decode_utf16(raw, UTF_16BE, self),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextEncoding::ALL
            .into_iter()
            .find(|enc| enc.as_str() == s)
            .ok_or_else(|| UnknownEncoding(s.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown text encoding {0:?} (expected utf8, sjis, utf16le or utf16be)")]
pub struct UnknownEncoding(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("text is not valid {encoding}")]
pub struct DecodeError {
    pub encoding: TextEncoding,
}

fn strict(
    encoding: &'static Encoding,
    body: &[u8],
    declared: TextEncoding,
) -> Result<String, DecodeError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(Cow::into_owned)
        .ok_or(DecodeError { encoding: declared })
}

fn decode_utf16(
    raw: &[u8],
    default: &'static Encoding,
    declared: TextEncoding,
) -> Result<String, DecodeError> {
    let (encoding, body) = match Encoding::for_bom(raw) {
        Some((enc, len)) if enc == UTF_16LE || enc == UTF_16BE => {
            (enc, &raw[len..])
        }
        _ => (default, raw),
    };
    strict(encoding, body, declared)
}

/// Shift_JIS encoding for script helpers. Unmappable characters are an error.
pub fn encode_shift_jis(text: &str) -> Result<Vec<u8>, DecodeError> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    if had_errors {
        return Err(DecodeError {
            encoding: TextEncoding::ShiftJis,
        });
    }
    Ok(bytes.into_owned())
}

/// Per-lookup memo so rules sharing an encoding decode the text once.
#[derive(Default)]
pub(crate) struct DecodedText {
    slots: [Option<Result<String, DecodeError>>; 4],
}

impl DecodedText {
    pub(crate) fn get(
        &mut self,
        encoding: TextEncoding,
        raw: &[u8],
    ) -> Result<&str, DecodeError> {
        let slot = &mut self.slots[encoding.slot()];
        match slot.get_or_insert_with(|| encoding.decode(raw)) {
            Ok(text) => Ok(text.as_str()),
            Err(err) => Err(err.clone()),
        }
    }
}

impl fmt::Debug for DecodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoded = self.slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("DecodedText")
            .field("decoded_slots", &decoded)
            .finish()
    }
}
