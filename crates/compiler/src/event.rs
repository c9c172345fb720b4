//! The markup event front-end.
//!
//! A thin pull reader over the XML event stream: only element starts
//! and ends matter to the compiler; text, whitespace and comments are
//! skipped here so the parser sees a clean start/end sequence.

use std::collections::HashMap;
use std::io::Read;

use xml::common::Position;
use xml::reader::{EventReader, XmlEvent};

use crate::error::CompileError;

/// One markup event, as consumed by the parser.
#[derive(Debug, Clone)]
pub enum Event {
    Start {
        name: String,
        attributes: HashMap<String, String>,
        line: u64,
    },
    End {
        name: String,
        line: u64,
    },
    Eof,
}

impl Event {
    pub fn line(&self) -> u64 {
        match self {
            Event::Start { line, .. } | Event::End { line, .. } => *line,
            Event::Eof => 0,
        }
    }
}

/// Pull reader yielding [`Event`]s from markup text.
pub struct MarkupReader<R: Read> {
    inner: EventReader<R>,
}

impl<R: Read> MarkupReader<R> {
    pub fn new(source: R) -> MarkupReader<R> {
        MarkupReader {
            inner: EventReader::new(source),
        }
    }

    /// The next element start or end, or [`Event::Eof`].
    pub fn next(&mut self) -> Result<Event, CompileError> {
        loop {
            let line = self.inner.position().row + 1;
            match self.inner.next() {
                Ok(XmlEvent::StartElement {
                    name, attributes, ..
                }) => {
                    let attributes = attributes
                        .into_iter()
                        .map(|a| (a.name.local_name, a.value))
                        .collect();
                    return Ok(Event::Start {
                        name: name.local_name,
                        attributes,
                        line,
                    });
                }
                Ok(XmlEvent::EndElement { name }) => {
                    return Ok(Event::End {
                        name: name.local_name,
                        line,
                    });
                }
                Ok(XmlEvent::EndDocument) => return Ok(Event::Eof),
                Ok(_) => continue,
                Err(e) => return Err(CompileError::Markup(e.to_string())),
            }
        }
    }
}
