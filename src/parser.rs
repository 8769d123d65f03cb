//! File parsing for multipart ingest
//!
//! Rich formats (PDF, office documents) are handled by external parsers that
//! hand over `(text, properties)`; this module implements the contract for
//! plain-text formats and rejects everything it cannot decode.

use crate::domain::PropertyType;
use crate::error::{RagError, Result};
use crate::usecases::IngestProperty;

/// Extensions decoded as UTF-8 text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "rst", "csv", "tsv", "json", "yaml", "yml", "xml", "html",
    "htm", "log",
];

/// Parse result: the document text plus its typed properties
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub text: String,
    pub properties: Vec<IngestProperty>,
}

/// Parse one uploaded file into text and properties.
///
/// Unknown or binary extensions fail with a validation error; the multipart
/// handlers collect these per file instead of aborting the batch.
pub fn parse_file(data: &[u8], filename: &str) -> Result<ParsedFile> {
    let extension = file_extension(filename);
    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(RagError::Validation(format!(
            "unsupported file type: {}",
            if extension.is_empty() { filename } else { &extension }
        )));
    }

    let text = String::from_utf8(data.to_vec())
        .map_err(|_| RagError::Validation(format!("{} is not valid UTF-8", filename)))?;

    let mut properties = vec![
        IngestProperty {
            key: "source_file_name".to_string(),
            value: filename.to_string(),
            property_type: PropertyType::String,
        },
        IngestProperty {
            key: "source_file_type".to_string(),
            value: extension.clone(),
            property_type: PropertyType::String,
        },
    ];
    if let Some(title) = file_stem(filename) {
        properties.push(IngestProperty {
            key: "title".to_string(),
            value: title,
            property_type: PropertyType::String,
        });
    }

    Ok(ParsedFile { text, properties })
}

fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn file_stem(filename: &str) -> Option<String> {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => filename,
    };
    let stem = stem.trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_file() {
        let parsed = parse_file(b"hello world", "notes.txt").unwrap();
        assert_eq!(parsed.text, "hello world");

        let keys: Vec<&str> = parsed.properties.iter().map(|p| p.key.as_str()).collect();
        assert!(keys.contains(&"source_file_name"));
        assert!(keys.contains(&"source_file_type"));
        assert!(keys.contains(&"title"));

        let title = parsed.properties.iter().find(|p| p.key == "title").unwrap();
        assert_eq!(title.value, "notes");
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let parsed = parse_file(b"# heading", "README.MD").unwrap();
        assert_eq!(
            parsed
                .properties
                .iter()
                .find(|p| p.key == "source_file_type")
                .unwrap()
                .value,
            "md"
        );
    }

    #[test]
    fn test_binary_extension_rejected() {
        let err = parse_file(b"%PDF-1.4", "report.pdf").unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = parse_file(&[0xff, 0xfe, 0x00], "data.txt").unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn test_file_without_extension_rejected() {
        assert!(parse_file(b"text", "Makefile").is_err());
    }
}
