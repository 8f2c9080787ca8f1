//! Status message format understood by the room-control panel
//!
//! ```text
//! {"strId":"box", "strName":"Box", "strStatus":"Activated", "number":"2"}
//! ```
//!
//! Field order is fixed, members are separated by `", "` and the number is
//! sent as decimal text. Encoding goes through serde_json so quotes and
//! control characters in a value are escaped instead of breaking the frame.

use std::io;
use std::string::FromUtf8Error;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Size hint for one encoded status message.
pub const STATUS_BUF_SIZE: usize = 150;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to encode status message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("status message is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// One prop's heartbeat as published on the broadcast topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusMessage<'a> {
    #[serde(rename = "strId")]
    pub id: &'a str,
    #[serde(rename = "strName")]
    pub name: &'a str,
    #[serde(rename = "strStatus")]
    pub status: &'a str,
    #[serde(serialize_with = "as_decimal_text")]
    pub number: i32,
}

impl StatusMessage<'_> {
    pub fn render(&self) -> Result<String, FormatError> {
        let mut serializer = serde_json::Serializer::with_formatter(
            Vec::with_capacity(STATUS_BUF_SIZE),
            WireFormatter,
        );
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8(serializer.into_inner())?)
    }
}

/// Builds the broadcast payload for one prop.
pub fn format_status(
    id: &str,
    name: &str,
    status: &str,
    number: i32,
) -> Result<String, FormatError> {
    StatusMessage {
        id,
        name,
        status,
        number,
    }
    .render()
}

/// Human-readable name for a prop id: underscores become spaces and a
/// leading ASCII lowercase letter is capitalized. Other leading characters
/// are kept as they are.
pub fn display_name(id: &str) -> String {
    let mut name = id.replace('_', " ");
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    name
}

fn as_decimal_text<S: Serializer>(number: &i32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(number)
}

/// Compact JSON with a space after each member separator.
struct WireFormatter;

impl serde_json::ser::Formatter for WireFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}
