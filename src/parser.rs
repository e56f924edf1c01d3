use crate::allocator::{checked_growth, Allocator, SystemAllocator};
use crate::scanner::Scanner;
use crate::{
    Encoding, Event, EventData, MappingStyle, Mark, ParserError, ScalarStyle, SequenceStyle,
    TagDirective, Token, TokenData, VersionDirective,
};

/// The parser structure.
#[non_exhaustive]
pub struct Parser<'r> {
    pub(crate) scanner: Scanner<'r>,
    /// The parser states stack.
    pub(crate) states: Vec<ParserState>,
    /// The current parser state.
    pub(crate) state: ParserState,
    /// The stack of marks.
    pub(crate) marks: Vec<Mark>,
    /// The list of TAG directives.
    pub(crate) tag_directives: Vec<TagDirective>,
    /// Set once `parse()` has returned an error; latches all further calls
    /// to `StreamEnd` rather than re-entering a potentially inconsistent
    /// state machine.
    pub(crate) errored: bool,
    /// One token of lookahead pulled from the scanner but not yet consumed.
    peeked: Option<Token>,
    allocator: Box<dyn Allocator>,
}

impl<'r> Default for Parser<'r> {
    fn default() -> Self {
        Self::new()
    }
}

/// The states of the parser.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum ParserState {
    /// Expect STREAM-START.
    #[default]
    StreamStart = 0,
    /// Expect the beginning of an implicit document.
    ImplicitDocumentStart = 1,
    /// Expect DOCUMENT-START.
    DocumentStart = 2,
    /// Expect the content of a document.
    DocumentContent = 3,
    /// Expect DOCUMENT-END.
    DocumentEnd = 4,
    /// Expect a block node.
    BlockNode = 5,
    /// Expect a block node or indentless sequence.
    BlockNodeOrIndentlessSequence = 6,
    /// Expect a flow node.
    FlowNode = 7,
    /// Expect the first entry of a block sequence.
    BlockSequenceFirstEntry = 8,
    /// Expect an entry of a block sequence.
    BlockSequenceEntry = 9,
    /// Expect an entry of an indentless sequence.
    IndentlessSequenceEntry = 10,
    /// Expect the first key of a block mapping.
    BlockMappingFirstKey = 11,
    /// Expect a block mapping key.
    BlockMappingKey = 12,
    /// Expect a block mapping value.
    BlockMappingValue = 13,
    /// Expect the first entry of a flow sequence.
    FlowSequenceFirstEntry = 14,
    /// Expect an entry of a flow sequence.
    FlowSequenceEntry = 15,
    /// Expect a key of an ordered mapping.
    FlowSequenceEntryMappingKey = 16,
    /// Expect a value of an ordered mapping.
    FlowSequenceEntryMappingValue = 17,
    /// Expect the and of an ordered mapping entry.
    FlowSequenceEntryMappingEnd = 18,
    /// Expect the first key of a flow mapping.
    FlowMappingFirstKey = 19,
    /// Expect a key of a flow mapping.
    FlowMappingKey = 20,
    /// Expect a value of a flow mapping.
    FlowMappingValue = 21,
    /// Expect an empty value of a flow mapping.
    FlowMappingEmptyValue = 22,
    /// Expect nothing.
    End = 23,
}

fn PEEK_TOKEN<'a>(parser: &'a mut Parser) -> Result<&'a Token, ParserError> {
    if parser.peeked.is_none() {
        parser.peeked = Some(parser.scanner.scan()?);
    }
    Ok(parser.peeked.as_ref().expect("token was just inserted"))
}

fn PEEK_TOKEN_MUT<'a>(parser: &'a mut Parser) -> Result<&'a mut Token, ParserError> {
    if parser.peeked.is_none() {
        parser.peeked = Some(parser.scanner.scan()?);
    }
    Ok(parser.peeked.as_mut().expect("token was just inserted"))
}

fn SKIP_TOKEN(parser: &mut Parser) {
    parser
        .peeked
        .take()
        .expect("SKIP_TOKEN called without a peeked token");
}

impl<'r> Parser<'r> {
    /// Create a parser.
    pub fn new() -> Parser<'r> {
        Self::new_with_allocator(Box::new(SystemAllocator))
    }

    /// Create a parser whose internal state/mark/tag-directive stacks grow
    /// under the given [`Allocator`] policy instead of the default
    /// doubling allocator.
    pub fn new_with_allocator(allocator: Box<dyn Allocator>) -> Parser<'r> {
        Parser {
            scanner: Scanner::new(),
            states: Vec::with_capacity(16),
            state: ParserState::default(),
            marks: Vec::with_capacity(16),
            tag_directives: Vec::with_capacity(16),
            errored: false,
            peeked: None,
            allocator,
        }
    }

    /// Pushes a state onto the parser state stack, checked against the
    /// configured [`Allocator`].
    fn push_state(&mut self, state: ParserState) -> Result<(), ParserError> {
        if self.states.len() + 1 > self.states.capacity() {
            let cap = checked_growth(&*self.allocator, self.states.len(), "parser state stack")?;
            self.states.reserve(cap - self.states.len());
        }
        self.states.push(state);
        Ok(())
    }

    /// Pushes a mark onto the parser mark stack, checked against the
    /// configured [`Allocator`].
    fn push_mark(&mut self, mark: Mark) -> Result<(), ParserError> {
        if self.marks.len() + 1 > self.marks.capacity() {
            let cap = checked_growth(&*self.allocator, self.marks.len(), "parser mark stack")?;
            self.marks.reserve(cap - self.marks.len());
        }
        self.marks.push(mark);
        Ok(())
    }

    /// Reset the parser state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set a string input.
    pub fn set_input_string(&mut self, input: &'r mut &[u8]) {
        self.scanner.set_input_string(input);
    }

    /// Set a generic input handler.
    pub fn set_input(&mut self, input: &'r mut dyn std::io::Read) {
        self.scanner.set_input(input);
    }

    /// Set the source encoding.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.scanner.set_encoding(encoding);
    }

    /// Parse the input stream and produce the next parsing event.
    ///
    /// Call the function subsequently to produce a sequence of events
    /// corresponding to the input stream. The initial event has the type
    /// [`EventData::StreamStart`](crate::EventData::StreamStart) while the
    /// ending event has the type
    /// [`EventData::StreamEnd`](crate::EventData::StreamEnd).
    ///
    /// Once this method has returned an error, the parser is considered
    /// latched: it will not attempt to resume the state machine, and every
    /// subsequent call returns
    /// [`EventData::StreamEnd`](crate::EventData::StreamEnd) instead of
    /// re-entering a possibly inconsistent state.
    pub fn parse(&mut self) -> Result<Event, ParserError> {
        if self.errored || self.state == ParserState::End {
            return Ok(Event::stream_end());
        }
        self.state_machine().map_err(|err| {
            self.errored = true;
            err
        })
    }

    fn set_parser_error<T>(problem: &'static str, problem_mark: Mark) -> Result<T, ParserError> {
        Err(ParserError::Problem {
            problem,
            mark: problem_mark,
        })
    }

    fn set_parser_error_context<T>(
        context: &'static str,
        context_mark: Mark,
        problem: &'static str,
        problem_mark: Mark,
    ) -> Result<T, ParserError> {
        Err(ParserError::ProblemWithContext {
            context,
            context_mark,
            problem,
            mark: problem_mark,
        })
    }

    fn state_machine(&mut self) -> Result<Event, ParserError> {
        match self.state {
            ParserState::StreamStart => self.parse_stream_start(),
            ParserState::ImplicitDocumentStart => self.parse_document_start(true),
            ParserState::DocumentStart => self.parse_document_start(false),
            ParserState::DocumentContent => self.parse_document_content(),
            ParserState::DocumentEnd => self.parse_document_end(),
            ParserState::BlockNode => self.parse_node(true, false),
            ParserState::BlockNodeOrIndentlessSequence => self.parse_node(true, true),
            ParserState::FlowNode => self.parse_node(false, false),
            ParserState::BlockSequenceFirstEntry => self.parse_block_sequence_entry(true),
            ParserState::BlockSequenceEntry => self.parse_block_sequence_entry(false),
            ParserState::IndentlessSequenceEntry => self.parse_indentless_sequence_entry(),
            ParserState::BlockMappingFirstKey => self.parse_block_mapping_key(true),
            ParserState::BlockMappingKey => self.parse_block_mapping_key(false),
            ParserState::BlockMappingValue => self.parse_block_mapping_value(),
            ParserState::FlowSequenceFirstEntry => self.parse_flow_sequence_entry(true),
            ParserState::FlowSequenceEntry => self.parse_flow_sequence_entry(false),
            ParserState::FlowSequenceEntryMappingKey => {
                self.parse_flow_sequence_entry_mapping_key()
            }
            ParserState::FlowSequenceEntryMappingValue => {
                self.parse_flow_sequence_entry_mapping_value()
            }
            ParserState::FlowSequenceEntryMappingEnd => {
                self.parse_flow_sequence_entry_mapping_end()
            }
            ParserState::FlowMappingFirstKey => self.parse_flow_mapping_key(true),
            ParserState::FlowMappingKey => self.parse_flow_mapping_key(false),
            ParserState::FlowMappingValue => self.parse_flow_mapping_value(false),
            ParserState::FlowMappingEmptyValue => self.parse_flow_mapping_value(true),
            ParserState::End => panic!("parser end state reached unexpectedly"),
        }
    }

    fn parse_stream_start(&mut self) -> Result<Event, ParserError> {
        let token = PEEK_TOKEN(self)?;

        if let TokenData::StreamStart { encoding } = &token.data {
            let event = Event {
                data: EventData::StreamStart {
                    encoding: *encoding,
                },
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = ParserState::ImplicitDocumentStart;
            SKIP_TOKEN(self);
            Ok(event)
        } else {
            let mark = token.start_mark;
            Self::set_parser_error("did not find expected <stream-start>", mark)
        }
    }

    fn parse_document_start(&mut self, implicit: bool) -> Result<Event, ParserError> {
        let mut version_directive: Option<VersionDirective> = None;

        let mut tag_directives = vec![];
        let mut token = PEEK_TOKEN(self)?;
        if !implicit {
            while let TokenData::DocumentEnd = &token.data {
                SKIP_TOKEN(self);
                token = PEEK_TOKEN(self)?;
            }
        }
        if implicit
            && !matches!(
                token.data,
                TokenData::VersionDirective { .. }
                    | TokenData::TagDirective { .. }
                    | TokenData::DocumentStart
                    | TokenData::StreamEnd
            )
        {
            let event = Event {
                data: EventData::DocumentStart {
                    version_directive: None,
                    tag_directives: vec![],
                    implicit: true,
                },
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.process_directives(None, None)?;
            self.push_state(ParserState::DocumentEnd)?;
            self.state = ParserState::BlockNode;
            Ok(event)
        } else if !matches!(token.data, TokenData::StreamEnd) {
            let end_mark: Mark;
            let start_mark: Mark = token.start_mark;
            self.process_directives(Some(&mut version_directive), Some(&mut tag_directives))?;
            token = PEEK_TOKEN(self)?;
            if let TokenData::DocumentStart = token.data {
                end_mark = token.end_mark;
                let event = Event {
                    data: EventData::DocumentStart {
                        version_directive,
                        tag_directives: core::mem::take(&mut tag_directives),
                        implicit: false,
                    },
                    start_mark,
                    end_mark,
                };
                self.push_state(ParserState::DocumentEnd)?;
                self.state = ParserState::DocumentContent;
                SKIP_TOKEN(self);
                Ok(event)
            } else {
                Self::set_parser_error("did not find expected <document start>", token.start_mark)
            }
        } else {
            let event = Event {
                data: EventData::StreamEnd,
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = ParserState::End;
            SKIP_TOKEN(self);
            Ok(event)
        }
    }

    fn parse_document_content(&mut self) -> Result<Event, ParserError> {
        let token = PEEK_TOKEN(self)?;
        if let TokenData::VersionDirective { .. }
        | TokenData::TagDirective { .. }
        | TokenData::DocumentStart
        | TokenData::DocumentEnd
        | TokenData::StreamEnd = &token.data
        {
            let mark = token.start_mark;
            self.state = self.states.pop().unwrap();
            Self::process_empty_scalar(mark)
        } else {
            self.parse_node(true, false)
        }
    }

    fn parse_document_end(&mut self) -> Result<Event, ParserError> {
        let mut end_mark: Mark;
        let mut implicit = true;
        let token = PEEK_TOKEN(self)?;
        end_mark = token.start_mark;
        let start_mark: Mark = end_mark;
        if let TokenData::DocumentEnd = &token.data {
            end_mark = token.end_mark;
            SKIP_TOKEN(self);
            implicit = false;
        }
        self.tag_directives.clear();
        self.state = ParserState::DocumentStart;
        Ok(Event {
            data: EventData::DocumentEnd { implicit },
            start_mark,
            end_mark,
        })
    }

    fn parse_node(&mut self, block: bool, indentless_sequence: bool) -> Result<Event, ParserError> {
        let mut anchor: Option<String> = None;
        let mut tag_handle: Option<String> = None;
        let mut tag_suffix: Option<String> = None;
        let mut tag: Option<String> = None;
        let mut start_mark: Mark;
        let mut end_mark: Mark;
        let mut tag_mark = Mark {
            index: 0,
            line: 0,
            column: 0,
        };

        let mut token = PEEK_TOKEN_MUT(self)?;

        if let TokenData::Alias { value } = &mut token.data {
            let event = Event {
                data: EventData::Alias {
                    anchor: core::mem::take(value),
                },
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = self.states.pop().unwrap();
            SKIP_TOKEN(self);
            return Ok(event);
        }

        end_mark = token.start_mark;
        start_mark = end_mark;
        if let TokenData::Anchor { value } = &mut token.data {
            anchor = Some(core::mem::take(value));
            start_mark = token.start_mark;
            end_mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN_MUT(self)?;
            if let TokenData::Tag { handle, suffix } = &mut token.data {
                tag_handle = Some(core::mem::take(handle));
                tag_suffix = Some(core::mem::take(suffix));
                tag_mark = token.start_mark;
                end_mark = token.end_mark;
                SKIP_TOKEN(self);
            }
        } else if let TokenData::Tag { handle, suffix } = &mut token.data {
            tag_handle = Some(core::mem::take(handle));
            tag_suffix = Some(core::mem::take(suffix));
            tag_mark = token.start_mark;
            start_mark = tag_mark;
            end_mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN_MUT(self)?;
            if let TokenData::Anchor { value } = &mut token.data {
                anchor = Some(core::mem::take(value));
                end_mark = token.end_mark;
                SKIP_TOKEN(self);
            }
        }

        if let Some(ref tag_handle_value) = tag_handle {
            if tag_handle_value.is_empty() {
                tag = tag_suffix;
            } else {
                for tag_directive in &self.tag_directives {
                    if tag_directive.handle == *tag_handle_value {
                        let suffix = tag_suffix.as_deref().unwrap_or("");
                        tag = Some(format!("{}{}", tag_directive.prefix, suffix));
                        break;
                    }
                }
                if tag.is_none() {
                    return Self::set_parser_error_context(
                        "while parsing a node",
                        start_mark,
                        "found undefined tag handle",
                        tag_mark,
                    );
                }
            }
        }

        let token = PEEK_TOKEN_MUT(self)?;

        let implicit = tag.is_none() || tag.as_deref() == Some("");

        if indentless_sequence && matches!(token.data, TokenData::BlockEntry) {
            end_mark = token.end_mark;
            self.state = ParserState::IndentlessSequenceEntry;
            let event = Event {
                data: EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: SequenceStyle::Block,
                },
                start_mark,
                end_mark,
            };
            Ok(event)
        } else if let TokenData::Scalar { value, style } = &mut token.data {
            let mut plain_implicit = false;
            let mut quoted_implicit = false;
            end_mark = token.end_mark;
            if *style == ScalarStyle::Plain && tag.is_none() || tag.as_deref() == Some("!") {
                plain_implicit = true;
            } else if tag.is_none() {
                quoted_implicit = true;
            }
            let event = Event {
                data: EventData::Scalar {
                    anchor,
                    tag,
                    value: core::mem::take(value),
                    plain_implicit,
                    quoted_implicit,
                    style: *style,
                },
                start_mark,
                end_mark,
            };
            self.state = self.states.pop().unwrap();
            SKIP_TOKEN(self);
            return Ok(event);
        } else if let TokenData::FlowSequenceStart = &token.data {
            end_mark = token.end_mark;
            self.state = ParserState::FlowSequenceFirstEntry;
            let event = Event {
                data: EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: SequenceStyle::Flow,
                },
                start_mark,
                end_mark,
            };
            return Ok(event);
        } else if let TokenData::FlowMappingStart = &token.data {
            end_mark = token.end_mark;
            self.state = ParserState::FlowMappingFirstKey;
            let event = Event {
                data: EventData::MappingStart {
                    anchor,
                    tag,
                    implicit,
                    style: MappingStyle::Flow,
                },
                start_mark,
                end_mark,
            };
            return Ok(event);
        } else if block && matches!(token.data, TokenData::BlockSequenceStart) {
            end_mark = token.end_mark;
            self.state = ParserState::BlockSequenceFirstEntry;
            let event = Event {
                data: EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: SequenceStyle::Block,
                },
                start_mark,
                end_mark,
            };
            return Ok(event);
        } else if block && matches!(token.data, TokenData::BlockMappingStart) {
            end_mark = token.end_mark;
            self.state = ParserState::BlockMappingFirstKey;
            let event = Event {
                data: EventData::MappingStart {
                    anchor,
                    tag,
                    implicit,
                    style: MappingStyle::Block,
                },
                start_mark,
                end_mark,
            };
            return Ok(event);
        } else if anchor.is_some() || tag.is_some() {
            self.state = self.states.pop().unwrap();
            let event = Event {
                data: EventData::Scalar {
                    anchor,
                    tag,
                    value: String::new(),
                    plain_implicit: implicit,
                    quoted_implicit: false,
                    style: ScalarStyle::Plain,
                },
                start_mark,
                end_mark,
            };
            return Ok(event);
        } else {
            return Self::set_parser_error_context(
                if block {
                    "while parsing a block node"
                } else {
                    "while parsing a flow node"
                },
                start_mark,
                "did not find expected node content",
                token.start_mark,
            );
        }
    }

    fn parse_block_sequence_entry(&mut self, first: bool) -> Result<Event, ParserError> {
        if first {
            let token = PEEK_TOKEN(self)?;
            let mark = token.start_mark;
            self.push_mark(mark)?;
            SKIP_TOKEN(self);
        }

        let mut token = PEEK_TOKEN(self)?;

        if let TokenData::BlockEntry = &token.data {
            let mark: Mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;
            if matches!(token.data, TokenData::BlockEntry | TokenData::BlockEnd) {
                self.state = ParserState::BlockSequenceEntry;
                Self::process_empty_scalar(mark)
            } else {
                self.push_state(ParserState::BlockSequenceEntry)?;
                self.parse_node(true, false)
            }
        } else if let TokenData::BlockEnd = token.data {
            let event = Event {
                data: EventData::SequenceEnd,
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = self.states.pop().unwrap();
            let _ = self.marks.pop();
            SKIP_TOKEN(self);
            Ok(event)
        } else {
            let token_mark = token.start_mark;
            let mark = self.marks.pop().unwrap();
            return Self::set_parser_error_context(
                "while parsing a block collection",
                mark,
                "did not find expected '-' indicator",
                token_mark,
            );
        }
    }

    fn parse_indentless_sequence_entry(&mut self) -> Result<Event, ParserError> {
        let mut token = PEEK_TOKEN(self)?;
        if let TokenData::BlockEntry = token.data {
            let mark: Mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;

            if matches!(
                token.data,
                TokenData::BlockEntry | TokenData::Key | TokenData::Value | TokenData::BlockEnd
            ) {
                self.state = ParserState::IndentlessSequenceEntry;
                Self::process_empty_scalar(mark)
            } else {
                self.push_state(ParserState::IndentlessSequenceEntry)?;
                self.parse_node(true, false)
            }
        } else {
            let event = Event {
                data: EventData::SequenceEnd,
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = self.states.pop().unwrap();
            Ok(event)
        }
    }

    fn parse_block_mapping_key(&mut self, first: bool) -> Result<Event, ParserError> {
        if first {
            let token = PEEK_TOKEN(self)?;
            let mark = token.start_mark;
            self.push_mark(mark)?;
            SKIP_TOKEN(self);
        }

        let mut token = PEEK_TOKEN(self)?;
        if let TokenData::Key = token.data {
            let mark: Mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;
            if matches!(
                token.data,
                TokenData::Key | TokenData::Value | TokenData::BlockEnd
            ) {
                self.state = ParserState::BlockMappingValue;
                Self::process_empty_scalar(mark)
            } else {
                self.push_state(ParserState::BlockMappingValue)?;
                self.parse_node(true, true)
            }
        } else if let TokenData::BlockEnd = token.data {
            let event = Event {
                data: EventData::MappingEnd,
                start_mark: token.start_mark,
                end_mark: token.end_mark,
            };
            self.state = self.states.pop().unwrap();
            _ = self.marks.pop();
            SKIP_TOKEN(self);
            Ok(event)
        } else {
            let token_mark = token.start_mark;
            let mark = self.marks.pop().unwrap();
            Self::set_parser_error_context(
                "while parsing a block mapping",
                mark,
                "did not find expected key",
                token_mark,
            )
        }
    }

    fn parse_block_mapping_value(&mut self) -> Result<Event, ParserError> {
        let mut token = PEEK_TOKEN(self)?;
        if let TokenData::Value = token.data {
            let mark: Mark = token.end_mark;
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;
            if matches!(
                token.data,
                TokenData::Key | TokenData::Value | TokenData::BlockEnd
            ) {
                self.state = ParserState::BlockMappingKey;
                Self::process_empty_scalar(mark)
            } else {
                self.push_state(ParserState::BlockMappingKey)?;
                self.parse_node(true, true)
            }
        } else {
            let mark = token.start_mark;
            self.state = ParserState::BlockMappingKey;
            Self::process_empty_scalar(mark)
        }
    }

    fn parse_flow_sequence_entry(&mut self, first: bool) -> Result<Event, ParserError> {
        if first {
            let token = PEEK_TOKEN(self)?;
            let mark = token.start_mark;
            self.push_mark(mark)?;
            SKIP_TOKEN(self);
        }

        let mut token = PEEK_TOKEN(self)?;
        if !matches!(token.data, TokenData::FlowSequenceEnd) {
            if !first {
                if let TokenData::FlowEntry = token.data {
                    SKIP_TOKEN(self);
                    token = PEEK_TOKEN(self)?;
                } else {
                    let token_mark = token.start_mark;
                    let mark = self.marks.pop().unwrap();
                    return Self::set_parser_error_context(
                        "while parsing a flow sequence",
                        mark,
                        "did not find expected ',' or ']'",
                        token_mark,
                    );
                }
            }
            if let TokenData::Key = token.data {
                let event = Event {
                    data: EventData::MappingStart {
                        anchor: None,
                        tag: None,
                        implicit: true,
                        style: MappingStyle::Flow,
                    },
                    start_mark: token.start_mark,
                    end_mark: token.end_mark,
                };
                self.state = ParserState::FlowSequenceEntryMappingKey;
                SKIP_TOKEN(self);
                return Ok(event);
            } else if !matches!(token.data, TokenData::FlowSequenceEnd) {
                self.push_state(ParserState::FlowSequenceEntry)?;
                return self.parse_node(false, false);
            }
        }
        let event = Event {
            data: EventData::SequenceEnd,
            start_mark: token.start_mark,
            end_mark: token.end_mark,
        };
        self.state = self.states.pop().unwrap();
        _ = self.marks.pop();
        SKIP_TOKEN(self);
        Ok(event)
    }

    fn parse_flow_sequence_entry_mapping_key(&mut self) -> Result<Event, ParserError> {
        let token = PEEK_TOKEN(self)?;
        if matches!(
            token.data,
            TokenData::Value | TokenData::FlowEntry | TokenData::FlowSequenceEnd
        ) {
            let mark: Mark = token.end_mark;
            SKIP_TOKEN(self);
            self.state = ParserState::FlowSequenceEntryMappingValue;
            Self::process_empty_scalar(mark)
        } else {
            self.push_state(ParserState::FlowSequenceEntryMappingValue)?;
            self.parse_node(false, false)
        }
    }

    fn parse_flow_sequence_entry_mapping_value(&mut self) -> Result<Event, ParserError> {
        let mut token = PEEK_TOKEN(self)?;
        if let TokenData::Value = token.data {
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;
            if !matches!(
                token.data,
                TokenData::FlowEntry | TokenData::FlowSequenceEnd
            ) {
                self.push_state(ParserState::FlowSequenceEntryMappingEnd)?;
                return self.parse_node(false, false);
            }
        }
        let mark = token.start_mark;
        self.state = ParserState::FlowSequenceEntryMappingEnd;
        Self::process_empty_scalar(mark)
    }

    fn parse_flow_sequence_entry_mapping_end(&mut self) -> Result<Event, ParserError> {
        let token = PEEK_TOKEN(self)?;
        let start_mark = token.start_mark;
        let end_mark = token.end_mark;
        self.state = ParserState::FlowSequenceEntry;
        Ok(Event {
            data: EventData::MappingEnd,
            start_mark,
            end_mark,
        })
    }

    fn parse_flow_mapping_key(&mut self, first: bool) -> Result<Event, ParserError> {
        if first {
            let token = PEEK_TOKEN(self)?;
            let mark = token.start_mark;
            self.push_mark(mark)?;
            SKIP_TOKEN(self);
        }

        let mut token = PEEK_TOKEN(self)?;
        if !matches!(token.data, TokenData::FlowMappingEnd) {
            if !first {
                if let TokenData::FlowEntry = token.data {
                    SKIP_TOKEN(self);
                    token = PEEK_TOKEN(self)?;
                } else {
                    let token_mark = token.start_mark;
                    let mark = self.marks.pop().unwrap();
                    return Self::set_parser_error_context(
                        "while parsing a flow mapping",
                        mark,
                        "did not find expected ',' or '}'",
                        token_mark,
                    );
                }
            }
            if let TokenData::Key = token.data {
                SKIP_TOKEN(self);
                token = PEEK_TOKEN(self)?;
                if !matches!(
                    token.data,
                    TokenData::Value | TokenData::FlowEntry | TokenData::FlowMappingEnd
                ) {
                    self.push_state(ParserState::FlowMappingValue)?;
                    return self.parse_node(false, false);
                }
                let mark = token.start_mark;
                self.state = ParserState::FlowMappingValue;
                return Self::process_empty_scalar(mark);
            } else if !matches!(token.data, TokenData::FlowMappingEnd) {
                self.push_state(ParserState::FlowMappingEmptyValue)?;
                return self.parse_node(false, false);
            }
        }
        let event = Event {
            data: EventData::MappingEnd,
            start_mark: token.start_mark,
            end_mark: token.end_mark,
        };
        self.state = self.states.pop().unwrap();
        _ = self.marks.pop();
        SKIP_TOKEN(self);
        Ok(event)
    }

    fn parse_flow_mapping_value(&mut self, empty: bool) -> Result<Event, ParserError> {
        let mut token = PEEK_TOKEN(self)?;
        if empty {
            let mark = token.start_mark;
            self.state = ParserState::FlowMappingKey;
            return Self::process_empty_scalar(mark);
        }
        if let TokenData::Value = token.data {
            SKIP_TOKEN(self);
            token = PEEK_TOKEN(self)?;
            if !matches!(token.data, TokenData::FlowEntry | TokenData::FlowMappingEnd) {
                self.push_state(ParserState::FlowMappingKey)?;
                return self.parse_node(false, false);
            }
        }
        let mark = token.start_mark;
        self.state = ParserState::FlowMappingKey;
        Self::process_empty_scalar(mark)
    }

    fn process_empty_scalar(mark: Mark) -> Result<Event, ParserError> {
        Ok(Event {
            data: EventData::Scalar {
                anchor: None,
                tag: None,
                value: String::new(),
                plain_implicit: true,
                quoted_implicit: false,
                style: ScalarStyle::Plain,
            },
            start_mark: mark,
            end_mark: mark,
        })
    }

    fn process_directives(
        &mut self,
        version_directive_ref: Option<&mut Option<VersionDirective>>,
        tag_directives_ref: Option<&mut Vec<TagDirective>>,
    ) -> Result<(), ParserError> {
        let default_tag_directives: [TagDirective; 2] = [
            // TODO: Get rid of these heap allocations.
            TagDirective {
                handle: String::from("!"),
                prefix: String::from("!"),
            },
            TagDirective {
                handle: String::from("!!"),
                prefix: String::from("tag:yaml.org,2002:"),
            },
        ];
        let mut version_directive: Option<VersionDirective> = None;

        let mut tag_directives = Vec::with_capacity(16);

        let mut token = PEEK_TOKEN_MUT(self)?;

        loop {
            if !matches!(
                token.data,
                TokenData::VersionDirective { .. } | TokenData::TagDirective { .. }
            ) {
                break;
            }

            if let TokenData::VersionDirective { major, minor } = &token.data {
                let mark = token.start_mark;
                if version_directive.is_some() {
                    return Self::set_parser_error("found duplicate %YAML directive", mark);
                } else if *major != 1 || *minor != 1 {
                    return Self::set_parser_error("found incompatible YAML document", mark);
                }
                version_directive = Some(VersionDirective {
                    major: *major,
                    minor: *minor,
                });
            } else if let TokenData::TagDirective { handle, prefix } = &mut token.data {
                let value = TagDirective {
                    handle: core::mem::take(handle),
                    prefix: core::mem::take(prefix),
                };
                let mark = token.start_mark;
                self.append_tag_directive(value.clone(), false, mark)?;

                tag_directives.push(value);
            }

            SKIP_TOKEN(self);
            token = PEEK_TOKEN_MUT(self)?;
        }

        let start_mark = token.start_mark;
        for default_tag_directive in default_tag_directives {
            self.append_tag_directive(default_tag_directive, true, start_mark)?;
        }

        if let Some(version_directive_ref) = version_directive_ref {
            *version_directive_ref = version_directive;
        }
        if let Some(tag_directives_ref) = tag_directives_ref {
            if tag_directives.is_empty() {
                tag_directives_ref.clear();
                tag_directives.clear();
            } else {
                *tag_directives_ref = tag_directives;
            }
        } else {
            tag_directives.clear();
        }

        Ok(())
    }

    fn append_tag_directive(
        &mut self,
        value: TagDirective,
        allow_duplicates: bool,
        mark: Mark,
    ) -> Result<(), ParserError> {
        for tag_directive in &self.tag_directives {
            if value.handle == tag_directive.handle {
                if allow_duplicates {
                    return Ok(());
                }
                return Self::set_parser_error("found duplicate %TAG directive", mark);
            }
        }
        if self.tag_directives.len() + 1 > self.tag_directives.capacity() {
            let cap = checked_growth(
                &*self.allocator,
                self.tag_directives.len(),
                "tag directive stack",
            )?;
            self.tag_directives.reserve(cap - self.tag_directives.len());
        }
        self.tag_directives.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Vec<EventData> {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        let mut out = Vec::new();
        loop {
            let event = parser.parse().unwrap();
            let done = matches!(event.data, EventData::StreamEnd);
            out.push(event.data);
            if done {
                break;
            }
        }
        out
    }

    fn scalar_values(events: &[EventData]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                EventData::Scalar { value, .. } => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn explicit_document_with_block_mapping() {
        let events = parse_all("---\nkey: value\n");
        assert!(matches!(events[0], EventData::StreamStart { .. }));
        assert!(matches!(
            events[1],
            EventData::DocumentStart { implicit: false, .. }
        ));
        assert!(matches!(events[2], EventData::MappingStart { .. }));
        assert_eq!(scalar_values(&events), vec!["key", "value"]);
        assert!(events.contains(&EventData::MappingEnd));
        assert!(events.contains(&EventData::DocumentEnd { implicit: true }));
        assert!(matches!(events.last(), Some(EventData::StreamEnd)));
    }

    #[test]
    fn flow_sequence_of_scalars() {
        let events = parse_all("[a, b, c]\n");
        assert!(matches!(events[1], EventData::DocumentStart { implicit: true, .. }));
        assert!(matches!(
            events[2],
            EventData::SequenceStart {
                style: SequenceStyle::Flow,
                ..
            }
        ));
        assert_eq!(scalar_values(&events), vec!["a", "b", "c"]);
        assert!(events.contains(&EventData::SequenceEnd));
    }

    #[test]
    fn block_sequence_of_scalars() {
        let events = parse_all("- 1\n- 2\n");
        assert!(matches!(
            events[2],
            EventData::SequenceStart {
                style: SequenceStyle::Block,
                ..
            }
        ));
        assert_eq!(scalar_values(&events), vec!["1", "2"]);
    }

    #[test]
    fn double_quoted_scalar_folds_embedded_line_break() {
        let events = parse_all("\"a\nb\"\n");
        assert_eq!(scalar_values(&events), vec!["a b"]);
    }

    #[test]
    fn clipped_literal_block_scalar() {
        let events = parse_all("|\n  one\n  two\n");
        assert_eq!(scalar_values(&events), vec!["one\ntwo\n"]);
    }

    #[test]
    fn version_directive_and_anchored_scalar() {
        let events = parse_all("%YAML 1.1\n---\n&a foo\n");
        assert!(matches!(
            events[1],
            EventData::DocumentStart {
                version_directive: Some(VersionDirective { major: 1, minor: 1 }),
                implicit: false,
                ..
            }
        ));
        match &events[2] {
            EventData::Scalar { anchor, value, .. } => {
                assert_eq!(anchor.as_deref(), Some("a"));
                assert_eq!(value, "foo");
            }
            other => panic!("expected anchored scalar, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_yaml_version_is_a_parser_error() {
        let mut parser = Parser::new();
        let mut bytes = "%YAML 1.2\n---\nfoo\n".as_bytes();
        parser.set_input_string(&mut bytes);
        let mut saw_error = false;
        for _ in 0..10 {
            match parser.parse() {
                Ok(event) if matches!(event.data, EventData::StreamEnd) => break,
                Ok(_) => {}
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn duplicate_yaml_directive_is_a_parser_error() {
        let mut parser = Parser::new();
        let mut bytes = "%YAML 1.1\n%YAML 1.1\n---\nfoo\n".as_bytes();
        parser.set_input_string(&mut bytes);
        let mut saw_error = false;
        for _ in 0..10 {
            match parser.parse() {
                Ok(event) if matches!(event.data, EventData::StreamEnd) => break,
                Ok(_) => {}
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn empty_value_after_key_is_synthesized_as_empty_scalar() {
        let events = parse_all("key:\nother: value\n");
        assert_eq!(scalar_values(&events), vec!["key", "", "other", "value"]);
    }

    #[test]
    fn tag_directive_resolves_custom_handle() {
        let events = parse_all("%TAG !e! tag:example.com,2000:\n---\n!e!foo bar\n");
        match &events[2] {
            EventData::Scalar { tag, value, .. } => {
                assert_eq!(tag.as_deref(), Some("tag:example.com,2000:foo"));
                assert_eq!(value, "bar");
            }
            other => panic!("expected tagged scalar, got {other:?}"),
        }
    }

    #[test]
    fn once_errored_parser_latches_to_stream_end() {
        let mut parser = Parser::new();
        let mut bytes = "{a: 1,\nb\n".as_bytes();
        parser.set_input_string(&mut bytes);
        loop {
            match parser.parse() {
                Ok(event) if matches!(event.data, EventData::StreamEnd) => panic!("expected an error before stream end"),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        let event = parser.parse().unwrap();
        assert!(matches!(event.data, EventData::StreamEnd));
    }

    #[test]
    fn stream_start_reports_detected_encoding() {
        let events = parse_all("key: value\n");
        assert!(matches!(
            events[0],
            EventData::StreamStart {
                encoding: Encoding::Utf8
            }
        ));
    }

    #[test]
    fn parser_state_stack_respects_allocator_limit() {
        struct TinyAllocator;
        impl Allocator for TinyAllocator {
            fn max_entries(&self) -> usize {
                1
            }
        }
        let mut parser = Parser::new_with_allocator(Box::new(TinyAllocator));
        for _ in 0..16 {
            parser.push_state(ParserState::BlockNode).unwrap();
        }
        assert!(matches!(
            parser.push_state(ParserState::BlockNode),
            Err(ParserError::Memory(_))
        ));
    }
}
