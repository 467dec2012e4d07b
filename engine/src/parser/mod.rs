//! Source document loading with encoding auto-detection.
//!
//! Turns raw bytes into text and text into a [`SourceDocument`] (an XML tree
//! or a JSON value). No dialect knowledge lives here; the XML helpers at the
//! bottom compare namespace-stripped local names only.

use roxmltree::{Document, Node, ParsingOptions};
use serde_json::Value;
use std::path::Path;

use crate::error::{DocumentError, DocumentResult};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decoded input with the encoding that was used.
#[derive(Debug, Clone)]
pub struct DecodedInput {
    pub text: String,
    pub encoding: String,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "" => "windows-1252".to_string(),
        _ => charset.to_lowercase(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.to_string(),
            None => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        },
    }
}

/// Decode raw input, preferring UTF-8.
pub fn decode_bytes(bytes: &[u8]) -> DocumentResult<DecodedInput> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let decoded = match std::str::from_utf8(bytes) {
        Ok(text) => DecodedInput {
            text: text.to_string(),
            encoding: "utf-8".to_string(),
        },
        Err(_) => {
            let encoding = detect_encoding(bytes);
            DecodedInput {
                text: decode_content(bytes, &encoding),
                encoding,
            }
        }
    };

    if decoded.text.trim().is_empty() {
        return Err(DocumentError::Unreadable("document is empty".into()));
    }
    Ok(decoded)
}

/// Read and decode a file.
pub fn read_file(path: impl AsRef<Path>) -> DocumentResult<DecodedInput> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes)
}

// =============================================================================
// Source documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Xml,
    Json,
}

/// A parsed input document.
#[derive(Debug)]
pub enum SourceDocument<'input> {
    Xml(Document<'input>),
    Json(Value),
}

impl<'input> SourceDocument<'input> {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Xml(_) => DocumentKind::Xml,
            Self::Json(_) => DocumentKind::Json,
        }
    }

    pub fn as_xml(&self) -> Option<&Document<'input>> {
        match self {
            Self::Xml(doc) => Some(doc),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Xml(_) => None,
        }
    }
}

pub fn parse_xml(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options)
}

/// Parse text as XML or JSON, guided by the first significant character.
pub fn load_document(text: &str) -> DocumentResult<SourceDocument<'_>> {
    let trimmed = text.trim_start();
    match trimmed.chars().next() {
        Some('<') => parse_xml(text)
            .map(SourceDocument::Xml)
            .map_err(|e| DocumentError::Unreadable(format!("invalid XML: {}", e))),
        Some('{') | Some('[') => serde_json::from_str(trimmed)
            .map(SourceDocument::Json)
            .map_err(|e| DocumentError::Unreadable(format!("invalid JSON: {}", e))),
        Some(_) => Err(DocumentError::Unreadable(
            "input is neither XML nor JSON".into(),
        )),
        None => Err(DocumentError::Unreadable("document is empty".into())),
    }
}

// =============================================================================
// XML helpers
// =============================================================================

/// Namespace-stripped tag name.
pub fn local_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

/// First direct child element with this local name.
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    element_children(node).find(|c| local_name(*c) == name)
}

/// Elements reached by a `/`-separated path of local names.
pub fn descend<'a, 'input>(node: Node<'a, 'input>, path: &str) -> Vec<Node<'a, 'input>> {
    let mut current = vec![node];
    for step in path.split('/').filter(|s| !s.is_empty()) {
        current = current
            .into_iter()
            .flat_map(|n| element_children(n).filter(move |c| local_name(*c) == step))
            .collect();
    }
    current
}

/// Attribute by local name, ignoring any namespace.
pub fn attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}

/// Trimmed text of an element, `None` when blank.
pub fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

/// True when the element has no element children.
pub fn is_leaf(node: Node<'_, '_>) -> bool {
    element_children(node).next().is_none()
}

/// Count descendant elements with this local name.
pub fn count_elements(doc: &Document<'_>, name: &str) -> usize {
    doc.descendants()
        .filter(|n| n.is_element() && local_name(*n) == name)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("<SDDXML/>".as_bytes());
        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.text, "<SDDXML/>");
        assert_eq!(decoded.encoding, "utf-8");
    }

    #[test]
    fn test_latin1_decoding() {
        // "<City>San José</City>" in ISO-8859-1
        let mut bytes = b"<City>San Jos".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</City>");
        let decoded = decode_bytes(&bytes).unwrap();
        assert!(decoded.text.contains("San Jos"));
        assert!(decoded.text.contains("City>"));
    }

    #[test]
    fn test_empty_input_is_unreadable() {
        assert!(matches!(decode_bytes(b"   \n"), Err(DocumentError::Unreadable(_))));
    }

    #[test]
    fn test_load_document_kinds() {
        let xml = load_document("<Project name=\"A\"/>").unwrap();
        assert_eq!(xml.kind(), DocumentKind::Xml);

        let json = load_document("  {\"schema_version\": \"6.0\"}").unwrap();
        assert_eq!(json.kind(), DocumentKind::Json);
        assert_eq!(json.as_json().unwrap()["schema_version"], "6.0");
    }

    #[test]
    fn test_load_document_rejects_garbage() {
        assert!(matches!(load_document("hello"), Err(DocumentError::Unreadable(_))));
        assert!(matches!(load_document("<a><b></a>"), Err(DocumentError::Unreadable(_))));
        assert!(matches!(load_document("{\"a\": }"), Err(DocumentError::Unreadable(_))));
    }

    #[test]
    fn test_xml_helpers_strip_namespaces() {
        let src = r#"<x:Proj xmlns:x="urn:cibd" xmlns:u="urn:units">
            <x:Name>Demo</x:Name>
            <x:Loc><x:City>Fresno</x:City></x:Loc>
            <x:Area u:unit="ft2">100</x:Area>
        </x:Proj>"#;
        let doc = parse_xml(src).unwrap();
        let root = doc.root_element();

        assert_eq!(local_name(root), "Proj");
        assert_eq!(child(root, "Name").and_then(text), Some("Demo"));

        let city = descend(root, "Loc/City");
        assert_eq!(city.len(), 1);
        assert_eq!(text(city[0]), Some("Fresno"));

        let area = child(root, "Area").unwrap();
        assert_eq!(attribute(area, "unit"), Some("ft2"));
        assert!(is_leaf(area));
        assert!(!is_leaf(root));
        assert_eq!(count_elements(&doc, "City"), 1);
    }
}
