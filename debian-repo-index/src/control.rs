// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

Control metadata embedded in `.deb` files, entries in `Packages` indices and
`Release` manifests all share this syntax: paragraphs of `Name: value` fields
separated by blank lines, with indented lines continuing the previous field.
*/

use {
    crate::error::{RepositoryError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// Construct a multiline field whose first line is empty.
    ///
    /// This is the shape of checksum tables in `Release` files, where every
    /// row is on its own indented line.
    pub fn from_rows(name: Cow<'a, str>, rows: impl Iterator<Item = String>) -> Self {
        let value = rows
            .map(|row| format!("\n {}", row))
            .collect::<Vec<_>>()
            .join("")
            .into();

        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str].
    ///
    /// The value's original file formatting (including newlines and leading whitespace)
    /// is included.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Obtain an iterator of words in the value.
    pub fn iter_words(&self) -> Box<(dyn Iterator<Item = &str> + '_)> {
        Box::new(self.value.as_ref().split_ascii_whitespace())
    }

    /// Obtain an iterator of lines in the value.
    ///
    /// Leading whitespace from each line is stripped. Empty lines are skipped.
    pub fn iter_lines(&self) -> Box<(dyn Iterator<Item = &str> + '_)> {
        Box::new(
            self.value
                .lines()
                .map(|x| x.trim_start())
                .filter(|x| !x.is_empty()),
        )
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.to_string().as_bytes())
    }
}

impl<'a> std::fmt::Display for ControlField<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values beginning on the following line don't get a space after the colon.
        if self.value.starts_with('\n') {
            writeln!(f, "{}:{}", self.name, self.value)
        } else {
            writeln!(f, "{}: {}", self.name, self.value)
        }
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// Paragraphs can only contain a single occurrence of a field and this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph is empty.
    ///
    /// Empty is defined by the lack of any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already exists, the old value
    /// will be replaced by the incoming value.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        self.fields
            .retain(|cf| !cf.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Set the value of a field defined via strings.
    ///
    /// If a field with the same name (case insensitive compare) already exists, the old value
    /// will be replaced by the incoming value.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Remove a field from this paragraph.
    ///
    /// Returns the removed field, if present.
    pub fn remove_field(&mut self, name: &str) -> Option<ControlField<'a>> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name.as_ref().eq_ignore_ascii_case(name))?;

        Some(self.fields.remove(index))
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.as_ref().eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the value of a field that must be present.
    ///
    /// A missing field is reported as [RepositoryError::ControlRequiredFieldMissing].
    pub fn required_field_str(&self, name: &str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| RepositoryError::ControlRequiredFieldMissing(name.to_string()))
    }

    /// Obtain an iterator of words in the named field.
    pub fn iter_field_words(&self, name: &str) -> Option<Box<(dyn Iterator<Item = &str> + '_)>> {
        self.field(name).map(|f| f.iter_words())
    }

    /// Obtain an iterator of lines in the named field.
    pub fn iter_field_lines(&self, name: &str) -> Option<Box<(dyn Iterator<Item = &str> + '_)>> {
        self.field(name).map(|f| f.iter_lines())
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. However, an
    /// extra newline is not present. So if serializing multiple paragraphs, an
    /// additional line break must be written to effectively terminate this paragraph
    /// if the writer is not at EOF.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl<'a> std::fmt::Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            write!(f, "{}", field)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances of this type are essentially fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    /// Otherwise `Ok(None)` is returned.
    ///
    /// `Err` is returned if the control file in invalid.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_indented = (line.starts_with(' ') || line.starts_with('\t')) && line.len() > 1;

        let current_field = self.field.take();

        // Empty lines signify the end of a paragraph. Flush any state.
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

        match (current_field, is_indented) {
            // We have a field on the stack and got an unindented line. This
            // must be the beginning of a new field. Flush the current field.
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());

                Ok(None)
            }

            // A continuation line with nothing to continue.
            (None, true) => Err(RepositoryError::ControlParseError(format!(
                "continuation line without a field: '{}'",
                line.trim_end()
            ))),

            // We got a non-empty line and no field is currently being
            // processed. This must be the start of a new field.
            (None, false) => {
                self.field = Some(line.to_string());

                Ok(None)
            }

            // We have a field on the stack and got an indented line. This
            // must be a field value continuation. Add it to the current
            // field.
            (Some(v), true) => {
                self.field = Some(v + line);

                Ok(None)
            }
        }
    }

    /// Finish parsing, consuming self.
    ///
    /// If a non-empty paragraph is present in the instance, it will be returned. Else if there
    /// is no unflushed state, None is returned.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            RepositoryError::ControlParseError(format!(
                "error parsing line '{}'; missing colon",
                v.trim_end()
            ))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(RepositoryError::ControlParseError(format!(
                "error parsing line '{}'; empty field name",
                v.trim_end()
            )));
        }

        self.paragraph.set_field_from_string(
            Cow::Owned(name.to_string()),
            Cow::Owned(value.trim().to_string()),
        );

        Ok(())
    }
}

/// A reader for [ControlParagraph].
///
/// Instances are bound to a reader, which is capable of feeding lines into a parser.
///
/// Instances can be consumed as an iterator. Each call into the iterator will attempt to
/// read a full paragraph from the underlying reader.
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

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            let bytes_read = self.reader.read_line(&mut line)?;

            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
                // Continue reading.
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next() {
            Ok(Some(para)) => Some(Ok(para)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Parse the first paragraph out of control text.
pub fn parse_first_paragraph(data: &str) -> Result<ControlParagraph<'static>> {
    ControlParagraphReader::new(std::io::Cursor::new(data.as_bytes()))
        .next()
        .ok_or(RepositoryError::ControlFileNoParagraph)?
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn control_paragraph_field_semantics() {
        let mut p = ControlParagraph::default();

        // Same cased field name results in overwrite.
        p.set_field_from_string("foo".into(), "bar".into());
        p.set_field_from_string("foo".into(), "baz".into());
        assert_eq!(p.field("foo").unwrap().value, "baz");

        // Different case results in overwrite.
        p.set_field_from_string("FOO".into(), "bar".into());
        assert_eq!(p.field("foo").unwrap().value, "bar");
        assert_eq!(p.field("FOO").unwrap().value, "bar");
        assert_eq!(p.iter_fields().count(), 1);

        assert!(p.remove_field("Foo").is_some());
        assert!(p.remove_field("foo").is_none());
        assert!(p.is_empty());
    }

    #[test]
    fn parse_multiline_description() -> Result<()> {
        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(indoc! {"
            Package: hello
            Architecture: aarch64
            Description: a greeting
             Prints a friendly greeting.
             .
             Twice.

            Package: other
            Architecture: all
        "}))
        .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 2);

        let p = &paragraphs[0];
        assert_eq!(p.field_str("package"), Some("hello"));
        assert_eq!(p.field_str("Architecture"), Some("aarch64"));
        assert_eq!(
            p.iter_field_lines("Description").unwrap().collect::<Vec<_>>(),
            vec!["a greeting", "Prints a friendly greeting.", ".", "Twice."]
        );

        // Serializing preserves continuation lines.
        assert_eq!(
            p.to_string(),
            indoc! {"
                Package: hello
                Architecture: aarch64
                Description: a greeting
                 Prints a friendly greeting.
                 .
                 Twice.
            "}
        );

        assert_eq!(paragraphs[1].field_str("Package"), Some("other"));

        Ok(())
    }

    #[test]
    fn required_field_missing() -> Result<()> {
        let p = parse_first_paragraph("Package: foo\n")?;

        assert_eq!(p.required_field_str("Package")?, "foo");
        assert!(matches!(
            p.required_field_str("Architecture"),
            Err(RepositoryError::ControlRequiredFieldMissing(name)) if name == "Architecture"
        ));

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_first_paragraph("no colon here\n"),
            Err(RepositoryError::ControlParseError(_))
        ));
        assert!(matches!(
            parse_first_paragraph(" dangling continuation\n"),
            Err(RepositoryError::ControlParseError(_))
        ));
        assert!(matches!(
            parse_first_paragraph("\n\n"),
            Err(RepositoryError::ControlFileNoParagraph)
        ));
    }

    #[test]
    fn rows_field_formatting() {
        let field = ControlField::from_rows(
            "MD5Sum".into(),
            ["abc 1 foo".to_string(), "def 2 bar".to_string()].into_iter(),
        );

        assert_eq!(field.to_string(), "MD5Sum:\n abc 1 foo\n def 2 bar\n");
        assert_eq!(
            field.iter_lines().collect::<Vec<_>>(),
            vec!["abc 1 foo", "def 2 bar"]
        );
    }
}
