// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::Read;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::AppError;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BodyFormat {
    Json,
    Base64,
    String,
}

impl BodyFormat {
    pub const ALL: [BodyFormat; 3] = [BodyFormat::Json, BodyFormat::Base64, BodyFormat::String];
}

impl FromStr for BodyFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JSON" => Ok(BodyFormat::Json),
            "BASE64" => Ok(BodyFormat::Base64),
            "STRING" => Ok(BodyFormat::String),
            _ => Err(AppError::InvalidQuery(format!("unknown body format: {}", s))),
        }
    }
}

/// Body formats to render: none unless `include_body`, then either the single
/// requested format or all of them.
pub fn body_formats(include_body: bool, format: Option<BodyFormat>) -> BTreeSet<BodyFormat> {
    match (include_body, format) {
        (false, _) => BTreeSet::new(),
        (true, Some(format)) => BTreeSet::from([format]),
        (true, None) => BTreeSet::from(BodyFormat::ALL),
    }
}

/// Decoded forms of a message body. Each field is present only when it was
/// requested and could be produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyRepresentation {
    pub base64: Option<String>,
    pub text: Option<String>,
    pub json: Option<serde_json::Value>,
    pub charset: Option<String>,
}

impl BodyRepresentation {
    pub fn decode(
        raw: Option<&[u8]>,
        content_encoding: Option<&str>,
        formats: &BTreeSet<BodyFormat>,
    ) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        if formats.is_empty() {
            return Self::default();
        }

        let base64 = formats
            .contains(&BodyFormat::Base64)
            .then(|| STANDARD.encode(raw));

        let bytes = match content_encoding {
            Some(encoding) if encoding.eq_ignore_ascii_case("gzip") => gunzip(raw),
            _ => Cow::Borrowed(raw),
        };
        let charset = detect_charset(&bytes);
        let text = charset.and_then(|charset| decode_text(&bytes, charset));

        let json = if formats.contains(&BodyFormat::Json) {
            text.as_deref()
                .and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok())
        } else {
            None
        };

        Self {
            base64,
            text: text.filter(|_| formats.contains(&BodyFormat::String)),
            json,
            charset: charset.map(str::to_string),
        }
    }
}

fn gunzip(raw: &[u8]) -> Cow<'_, [u8]> {
    let mut decoded = Vec::new();
    match GzDecoder::new(raw).read_to_end(&mut decoded) {
        Ok(_) => Cow::Owned(decoded),
        Err(err) => {
            warn!("body marked as gzip could not be inflated, using raw bytes: {}", err);
            Cow::Borrowed(raw)
        }
    }
}

fn detect_charset(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&UTF16_LE_BOM) {
        Some("UTF-16LE")
    } else if bytes.starts_with(&UTF16_BE_BOM) {
        Some("UTF-16BE")
    } else if std::str::from_utf8(bytes).is_ok() {
        Some("UTF-8")
    } else {
        trace!("no charset detected for {} body bytes", bytes.len());
        None
    }
}

fn decode_text(bytes: &[u8], charset: &str) -> Option<String> {
    match charset {
        "UTF-8" => std::str::from_utf8(bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes))
            .ok()
            .map(str::to_string),
        "UTF-16LE" | "UTF-16BE" => {
            let payload = &bytes[2..];
            if payload.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = payload
                .chunks_exact(2)
                .map(|pair| {
                    if charset == "UTF-16LE" {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}
