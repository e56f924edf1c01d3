#![doc = include_str!("../README.md")]
#![allow(non_snake_case)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::fn_params_excessive_bools,
    clippy::manual_range_contains,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::unnecessary_wraps,
    clippy::match_wildcard_for_single_variants
)]
#![deny(unsafe_code)]

#[macro_use]
mod macros;

mod allocator;
mod error;
mod event;
mod parser;
mod reader;
mod scanner;
mod token;

pub use crate::allocator::{Allocator, SystemAllocator};
pub use crate::error::{Mark, MemoryError, ParserError, ReaderError, ScannerError};
pub use crate::event::{Event, EventData};
pub use crate::parser::{Parser, ParserState};
pub use crate::reader::Reader;
pub use crate::scanner::{Scanner, SimpleKey};
pub use crate::token::{Token, TokenData};

pub(crate) const INPUT_RAW_BUFFER_SIZE: usize = 16384;

/// The stream encoding.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum Encoding {
    /// Detect the encoding by sniffing a byte order mark, defaulting to
    /// UTF-8 if none is present.
    #[default]
    Any = 0,
    /// UTF-8, with or without a byte order mark.
    Utf8 = 1,
    /// UTF-16 little-endian, with a required byte order mark.
    Utf16Le = 2,
    /// UTF-16 big-endian, with a required byte order mark.
    Utf16Be = 3,
}

/// Scalar styles.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum ScalarStyle {
    /// No particular style was requested; used for a synthesized empty
    /// scalar.
    #[default]
    Any = 0,
    /// An unquoted scalar.
    Plain = 1,
    /// A scalar delimited by single quotes.
    SingleQuoted = 2,
    /// A scalar delimited by double quotes.
    DoubleQuoted = 3,
    /// A `|` block scalar.
    Literal = 4,
    /// A `>` block scalar.
    Folded = 5,
}

/// Sequence styles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum SequenceStyle {
    /// An indentation-delimited sequence.
    Block = 1,
    /// A `[...]`-delimited sequence.
    Flow = 2,
}

/// Mapping styles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum MappingStyle {
    /// An indentation-delimited mapping.
    Block = 1,
    /// A `{...}`-delimited mapping.
    Flow = 2,
}

/// The `%YAML` directive data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct VersionDirective {
    /// The major version number.
    pub major: i32,
    /// The minor version number.
    pub minor: i32,
}

/// A `%TAG` directive: a handle (e.g. `!!`) mapped to a URI prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TagDirective {
    /// The tag handle.
    pub handle: String,
    /// The tag prefix.
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenData;

    #[test]
    fn scans_a_flow_sequence() {
        let mut scanner = Scanner::new();
        let mut input = "[a, b, c]\n".as_bytes();
        scanner.set_input_string(&mut input);

        let mut data = Vec::new();
        loop {
            let token = scanner.scan().unwrap();
            let done = matches!(token.data, TokenData::StreamEnd);
            data.push(token.data);
            if done {
                break;
            }
        }

        assert!(matches!(data[0], TokenData::StreamStart { .. }));
        assert!(data
            .iter()
            .any(|t| matches!(t, TokenData::FlowSequenceStart)));
    }

    #[test]
    fn parses_a_block_mapping() {
        let mut parser = Parser::new();
        let mut input = "---\nkey: value\n".as_bytes();
        parser.set_input_string(&mut input);

        let mut events = Vec::new();
        loop {
            let event = parser.parse().unwrap();
            let done = matches!(event.data, EventData::StreamEnd);
            events.push(event.data);
            if done {
                break;
            }
        }

        assert!(matches!(events[0], EventData::StreamStart { .. }));
        assert!(matches!(
            events[1],
            EventData::DocumentStart { implicit: false, .. }
        ));
        assert!(matches!(events[2], EventData::MappingStart { .. }));
    }
}



