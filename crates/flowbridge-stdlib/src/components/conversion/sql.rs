//! SQL statements for JDBC-style sinks

use super::{columns, field, records, Column, Record};
use flowbridge_core::domain::conversion::{FlatFileOptions, SqlOperation};
use flowbridge_core::xml::XmlDocument;
use flowbridge_core::CoreError;

fn is_identifier(name: &str) -> bool {
    let part = |p: &str| {
        let mut chars = p.chars();
        chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match name.split_once('.') {
        Some((schema, table)) => part(schema) && part(table),
        None => part(name),
    }
}

fn identifier(name: &str) -> Result<&str, CoreError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(CoreError::ConfigurationError(format!(
            "'{}' is not a valid SQL identifier",
            name
        )))
    }
}

fn literal(value: Option<&str>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(v) if v.is_empty() => "NULL".to_string(),
        Some(v) if is_numeric(v) => v.to_string(),
        Some(v) => format!("'{}'", v.replace('\'', "''")),
    }
}

fn is_numeric(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty()
        && !(digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0."))
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && !digits.ends_with('.')
}

// `{field}` placeholders in the WHERE clause become record literals
fn where_clause(template: &str, record: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_identifier(&after[..end]) => {
                out.push_str(&literal(field(record, &after[..end])));
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// XML records to SQL statements, one per line
pub fn xml_to_sql(
    doc: &XmlDocument,
    options: &FlatFileOptions,
    mappings: &[(String, String)],
) -> Result<String, CoreError> {
    let table = identifier(&options.table_name)?;
    let records = records(doc);
    let columns: Vec<Column> = columns(&records, &options.column_order, mappings);
    for column in &columns {
        identifier(&column.header)?;
    }
    let names = columns
        .iter()
        .map(|c| c.header.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let values = |record: &Record| {
        columns
            .iter()
            .map(|c| literal(field(record, &c.source)))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut statements = Vec::new();
    match options.operation {
        SqlOperation::Insert if options.generate_batch => {
            let rows = records
                .iter()
                .map(|r| format!("({})", values(r)))
                .collect::<Vec<_>>()
                .join(",\n  ");
            statements.push(format!("INSERT INTO {} ({}) VALUES\n  {};", table, names, rows));
        }
        SqlOperation::Insert => {
            for record in &records {
                statements.push(format!("INSERT INTO {} ({}) VALUES ({});", table, names, values(record)));
            }
        }
        SqlOperation::Update => {
            let template = require_where(options)?;
            for record in &records {
                let assignments = columns
                    .iter()
                    .map(|c| format!("{} = {}", c.header, literal(field(record, &c.source))))
                    .collect::<Vec<_>>()
                    .join(", ");
                statements.push(format!(
                    "UPDATE {} SET {} WHERE {};",
                    table,
                    assignments,
                    where_clause(template, record)
                ));
            }
        }
        SqlOperation::Delete => {
            let template = require_where(options)?;
            for record in &records {
                statements.push(format!("DELETE FROM {} WHERE {};", table, where_clause(template, record)));
            }
        }
    }

    let mut out = statements.join(&options.line_terminator);
    out.push_str(&options.line_terminator);
    Ok(out)
}

fn require_where(options: &FlatFileOptions) -> Result<&str, CoreError> {
    options
        .where_clause
        .as_deref()
        .filter(|w| !w.trim().is_empty())
        .ok_or_else(|| {
            CoreError::ConfigurationError(format!(
                "{:?} statements require a whereClause",
                options.operation
            ))
        })
}
