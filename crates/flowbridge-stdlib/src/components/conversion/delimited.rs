//! Delimited text

use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

use super::json_xml::element_name;
use super::{columns, field, records};
use flowbridge_core::domain::conversion::FlatFileOptions;
use flowbridge_core::xml::{XmlDocument, XmlElement};
use flowbridge_core::CoreError;

const DEFAULT_ROOT: &str = "records";
const DEFAULT_RECORD: &str = "record";

/// CSV text to `<records><record>...</record></records>`
pub fn csv_to_xml(text: &str, options: &FlatFileOptions) -> Result<String, CoreError> {
    let delimiter = single_byte(&options.delimiter, "delimiter")?;
    let quote = single_byte(&options.quote_character, "quoteCharacter")?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .quote(quote)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result.map_err(|err| {
            CoreError::SerializationError(format!("Invalid CSV at row {}: {}", index + 1, err))
        })?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }
    let mut rows = rows.into_iter();

    let headers: Vec<String> = if options.include_headers {
        rows.next()
            .map(|row| row.iter().map(str::to_string).collect())
            .unwrap_or_default()
    } else {
        options.column_order.clone()
    };

    let mut root = XmlElement::new(options.root_element.as_deref().unwrap_or(DEFAULT_ROOT));
    for row in rows {
        let mut record = XmlElement::new(options.record_element.as_deref().unwrap_or(DEFAULT_RECORD));
        for (index, value) in row.iter().enumerate() {
            let name = headers
                .get(index)
                .map(|h| element_name(h.trim()))
                .unwrap_or_else(|| format!("field{}", index + 1));
            let mut cell = XmlElement::new(name);
            cell.set_text(value);
            record.append_child(cell);
        }
        root.append_child(record);
    }
    Ok(XmlDocument::new(root).to_xml())
}

/// XML records to CSV text
pub fn xml_to_csv(
    doc: &XmlDocument,
    options: &FlatFileOptions,
    mappings: &[(String, String)],
) -> Result<String, CoreError> {
    let delimiter = single_byte(&options.delimiter, "delimiter")?;
    let quote = single_byte(&options.quote_character, "quoteCharacter")?;
    let terminator = match options.line_terminator.as_str() {
        "\r\n" => Terminator::CRLF,
        other => Terminator::Any(single_byte(other, "lineTerminator")?),
    };
    let records = records(doc);
    let columns = columns(&records, &options.column_order, mappings);

    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .quote(quote)
        .terminator(terminator)
        .quote_style(if options.quote_all_fields {
            QuoteStyle::Always
        } else {
            QuoteStyle::Necessary
        })
        .has_headers(false)
        .from_writer(Vec::new());

    if options.include_headers {
        writer
            .write_record(columns.iter().map(|c| c.header.as_str()))
            .map_err(write_error)?;
    }
    for record in &records {
        writer
            .write_record(columns.iter().map(|c| field(record, &c.source).unwrap_or_default()))
            .map_err(write_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| CoreError::SerializationError(format!("Cannot flush CSV output: {}", err)))?;
    String::from_utf8(bytes).map_err(|err| CoreError::SerializationError(err.to_string()))
}

fn write_error(err: csv::Error) -> CoreError {
    CoreError::SerializationError(format!("Cannot write CSV record: {}", err))
}

fn single_byte(value: &str, key: &str) -> Result<u8, CoreError> {
    let value = if value == "\\t" { "\t" } else { value };
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(CoreError::ConfigurationError(format!(
            "CSV {} must be a single ASCII character, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_to_xml_with_quotes() {
        let options = FlatFileOptions::default();
        let xml = csv_to_xml("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n", &options).unwrap();
        assert_eq!(
            xml,
            "<records><record><name>Smith, J</name><note>said \"hi\"</note></record></records>"
        );
    }

    #[test]
    fn test_xml_to_csv_quoting_and_headers() {
        let doc = XmlDocument::parse(
            "<rs><r><id>1</id><name>Smith, J</name></r><r><id>2</id><name>Lee</name></r></rs>",
        )
        .unwrap();
        let options = FlatFileOptions::default();
        assert_eq!(
            xml_to_csv(&doc, &options, &[]).unwrap(),
            "id,name\n1,\"Smith, J\"\n2,Lee\n"
        );

        let options = FlatFileOptions {
            delimiter: ";".to_string(),
            include_headers: false,
            quote_all_fields: true,
            line_terminator: "\r\n".to_string(),
            ..FlatFileOptions::default()
        };
        assert_eq!(
            xml_to_csv(&doc, &options, &[]).unwrap(),
            "\"1\";\"Smith, J\"\r\n\"2\";\"Lee\"\r\n"
        );
    }

    #[test]
    fn test_mapped_columns_are_renamed() {
        let doc = XmlDocument::parse("<r><Amount>42</Amount><Extra>x</Extra></r>").unwrap();
        let mappings = vec![("Amount".to_string(), "Total".to_string())];
        assert_eq!(
            xml_to_csv(&doc, &FlatFileOptions::default(), &mappings).unwrap(),
            "Total\n42\n"
        );
    }

    #[test]
    fn test_quoted_newline_stays_in_one_field() {
        let options = FlatFileOptions::default();
        let xml = csv_to_xml("id,note\n1,\"line one\nline two\"\n", &options).unwrap();
        assert_eq!(
            xml,
            "<records><record><id>1</id><note>line one\nline two</note></record></records>"
        );

        let doc = XmlDocument::parse(&xml).unwrap();
        let csv = xml_to_csv(&doc, &options, &[]).unwrap();
        assert_eq!(csv, "id,note\n1,\"line one\nline two\"\n");
        assert_eq!(csv_to_xml(&csv, &options).unwrap(), xml);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let xml = csv_to_xml("a,b\n\n1,2\n\n", &FlatFileOptions::default()).unwrap();
        assert_eq!(xml, "<records><record><a>1</a><b>2</b></record></records>");
    }

    #[test]
    fn test_bad_delimiter() {
        let options = FlatFileOptions {
            delimiter: "||".to_string(),
            ..FlatFileOptions::default()
        };
        assert!(matches!(csv_to_xml("a", &options), Err(CoreError::ConfigurationError(_))));
    }
}
