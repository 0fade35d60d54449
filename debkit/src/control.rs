// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file primitives.

Control files consist of *paragraphs* of `Name: value` fields separated by
blank lines. Continuation lines (leading whitespace) extend the previous
field's value. The same format underlies `DEBIAN/control` members, `Packages`
indices, `InRelease` documents and the dpkg `status` file.

Field values keep their continuation lines verbatim (an embedded newline
followed by the original leading space), so a document can be rewritten
byte-for-byte. This matters for the `status` file, where field order and
folding are stable across load/sync cycles.
*/

use {
    crate::error::{DebError, Result},
    std::io::{BufRead, Write},
};

/// A single field in a control paragraph.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    /// Construct an instance from a field name and value.
    pub fn new(name: String, value: String) -> Self {
        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw value, including any continuation formatting.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Iterate over the lines of the value, leading whitespace stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|line| line.trim_start())
    }

    /// Iterate over whitespace-separated words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.split_ascii_whitespace()
    }

    /// Serialize the field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// An ordered series of control fields.
///
/// Field names compare case-insensitively on lookup and preserve their case
/// on write. Setting a field that already exists updates it in place so the
/// serialized field order is stable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field, updating an existing field in place.
    pub fn set_field(&mut self, name: &str, value: String) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
        {
            Some(field) => field.value = value,
            None => self.fields.push(ControlField::new(name.to_string(), value)),
        }
    }

    /// Whether a named field is present.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Obtain the field with the given name.
    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value())
    }

    /// Iterate over fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField> {
        self.fields.iter()
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline terminates the final field but no blank paragraph
    /// separator is written.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl ToString for ControlParagraph {
    fn to_string(&self) -> String {
        let mut buffer = Vec::new();
        self.write(&mut buffer)
            .expect("in-memory write is infallible");

        String::from_utf8(buffer).expect("fields are UTF-8")
    }
}

/// Holds parsing state for control files.
///
/// Instances are fed lines of text and emit a [ControlParagraph] whenever a
/// blank line completes one.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// Returns a completed paragraph if the line terminated one.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') && line.len() > 1;

        let current_field = self.field.take();

        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_continuation) {
            // An unindented line begins a new field; flush the previous one.
            (Some(field), false) => {
                self.flush_field(field)?;
                self.field = Some(line.to_string());

                Ok(None)
            }
            (None, _) => {
                self.field = Some(line.to_string());

                Ok(None)
            }
            // An indented line extends the field being accumulated.
            (Some(field), true) => {
                self.field = Some(field + line);

                Ok(None)
            }
        }
    }

    /// Finish parsing, returning any paragraph still being accumulated.
    pub fn finish(mut self) -> Result<Option<ControlParagraph>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, accumulated: String) -> Result<()> {
        let mut parts = accumulated.splitn(2, ':');

        let name = parts.next().ok_or_else(|| {
            DebError::ControlParse(format!("missing colon in line '{}'", accumulated))
        })?;
        let value = parts
            .next()
            .ok_or_else(|| {
                DebError::ControlParse(format!("missing value in field '{}'", accumulated))
            })?
            .trim();

        self.paragraph.set_field(name, value.to_string());

        Ok(())
    }
}

/// Streaming reader yielding [ControlParagraph] instances from a [BufRead].
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = self.parser.take().expect("parser present until EOF");

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line)?;

            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parser.is_none() {
            None
        } else {
            match self.get_next() {
                Ok(Some(paragraph)) => Some(Ok(paragraph)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }
}

/// An ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile {
    paragraphs: Vec<ControlParagraph>,
}

impl ControlFile {
    /// Parse a control file from a reader.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Self> {
        let paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        Self::parse_reader(std::io::BufReader::new(s.as_bytes()))
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, paragraph: ControlParagraph) {
        self.paragraphs.push(paragraph);
    }

    /// Iterate over the paragraphs.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph> {
        self.paragraphs.iter()
    }

    /// Iterate over the paragraphs, consuming self.
    pub fn into_paragraphs(self) -> impl Iterator<Item = ControlParagraph> {
        self.paragraphs.into_iter()
    }

    /// Serialize the document, separating paragraphs with a blank line.
    ///
    /// No blank line follows the final paragraph, matching the dpkg status
    /// file convention.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (i, paragraph) in self.paragraphs.iter().enumerate() {
            if i > 0 {
                writer.write_all(b"\n")?;
            }
            paragraph.write(writer)?;
        }

        Ok(())
    }
}
