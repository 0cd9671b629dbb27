//! Exchange-document XML parser using quick-xml
//!
//! Streaming parser for EPO publication documents. Matching is
//! namespace-agnostic: elements are recognized by local name wherever the
//! producer put its prefixes.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::models::{
    Citation, DocumentId, ExchangeDocument, FamilyMember, PatentClassification,
    PublicationReference,
};

/// Rejection reason for one XML file.
#[derive(Debug)]
pub enum XmlError {
    /// Malformed XML.
    Syntax(quick_xml::Error),
    /// A required attribute is absent or empty.
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// A required child element is absent.
    MissingElement {
        parent: &'static str,
        element: &'static str,
    },
}

impl std::fmt::Display for XmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "malformed XML: {e}"),
            Self::MissingAttribute { element, attribute } => {
                write!(f, "<{element}> is missing required attribute {attribute:?}")
            }
            Self::MissingElement { parent, element } => {
                write!(f, "<{parent}> is missing required child <{element}>")
            }
        }
    }
}

impl std::error::Error for XmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax(e) => Some(e),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Syntax(e)
    }
}

type XmlReader<'a> = Reader<&'a [u8]>;

/// Parse every `exchange-document` element in one file, in document order.
///
/// A single offending document rejects the whole file.
pub fn parse_exchange_documents(xml: &str) -> Result<Vec<ExchangeDocument>, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut documents = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"exchange-document" => {
                documents.push(parse_document(&mut reader, &e)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"exchange-document" => {
                documents.push(ExchangeDocument {
                    country: require_attr(&e, "exchange-document", "country")?,
                    doc_number: require_attr(&e, "exchange-document", "doc-number")?,
                    kind: require_attr(&e, "exchange-document", "kind")?,
                    status: require_attr(&e, "exchange-document", "status")?,
                    ..Default::default()
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(documents)
}

fn parse_document(
    reader: &mut XmlReader,
    start: &BytesStart,
) -> Result<ExchangeDocument, XmlError> {
    let mut doc = ExchangeDocument {
        country: require_attr(start, "exchange-document", "country")?,
        doc_number: require_attr(start, "exchange-document", "doc-number")?,
        kind: require_attr(start, "exchange-document", "kind")?,
        status: require_attr(start, "exchange-document", "status")?,
        ..Default::default()
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            // The containers sit at varying depths below the document
            // root; descend through everything else to reach them.
            Event::Start(e) => match e.local_name().as_ref() {
                b"patent-classification" => {
                    doc.classifications.push(parse_classification(reader)?);
                }
                b"references-cited" => parse_references_cited(reader, &mut doc.citations)?,
                b"patent-family" => parse_patent_family(reader, &mut doc.family_members)?,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"patent-classification" => {
                return Err(XmlError::MissingElement {
                    parent: "patent-classification",
                    element: "classification-scheme",
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"exchange-document" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

fn parse_classification(reader: &mut XmlReader) -> Result<PatentClassification, XmlError> {
    let mut scheme = None;
    let mut symbol = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"classification-scheme" => {
                    scheme = Some(require_attr(&e, "classification-scheme", "scheme")?);
                    skip_element(reader)?;
                }
                b"classification-symbol" => {
                    symbol = Some(read_text(reader)?.trim().to_string());
                }
                _ => skip_element(reader)?,
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"classification-scheme" => {
                    scheme = Some(require_attr(&e, "classification-scheme", "scheme")?);
                }
                b"classification-symbol" => symbol = Some(String::new()),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"patent-classification" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(PatentClassification {
        scheme: scheme.ok_or(XmlError::MissingElement {
            parent: "patent-classification",
            element: "classification-scheme",
        })?,
        symbol: symbol.ok_or(XmlError::MissingElement {
            parent: "patent-classification",
            element: "classification-symbol",
        })?,
    })
}

fn parse_references_cited(
    reader: &mut XmlReader,
    citations: &mut Vec<Citation>,
) -> Result<(), XmlError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"citation" => citations.push(parse_citation(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"references-cited" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn parse_citation(reader: &mut XmlReader) -> Result<Citation, XmlError> {
    let mut citation = Citation::default();
    let mut have_cited_id = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"category" => {
                    let category = read_text(reader)?.trim().to_string();
                    if !category.is_empty() {
                        citation.categories.push(category);
                    }
                }
                b"rel-passage" => parse_rel_passage(reader, &mut citation.categories)?,
                b"patcit" => {
                    if let Some(id) = parse_patcit(reader)? {
                        if !have_cited_id {
                            citation.cited_id = id;
                            have_cited_id = true;
                        }
                    }
                }
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"citation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(citation)
}

fn parse_rel_passage(reader: &mut XmlReader, categories: &mut Vec<String>) -> Result<(), XmlError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"category" => {
                    let category = read_text(reader)?.trim().to_string();
                    if !category.is_empty() {
                        categories.push(category);
                    }
                }
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"rel-passage" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Returns the composed id of the first `document-id` under `patcit`,
/// or the empty string when all of country/doc-number/kind are empty.
fn parse_patcit(reader: &mut XmlReader) -> Result<Option<String>, XmlError> {
    let mut composed = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"document-id" => {
                    let id = parse_document_id(reader)?;
                    if composed.is_none() {
                        let all_empty =
                            id.country.is_empty() && id.doc_number.is_empty() && id.kind.is_empty();
                        composed = Some(if all_empty { String::new() } else { id.composed() });
                    }
                }
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"patcit" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(composed)
}

fn parse_document_id(reader: &mut XmlReader) -> Result<DocumentId, XmlError> {
    let mut id = DocumentId::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"country" => id.country = read_text(reader)?.trim().to_string(),
                b"doc-number" => id.doc_number = read_text(reader)?.trim().to_string(),
                b"kind" => id.kind = read_text(reader)?.trim().to_string(),
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"document-id" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(id)
}

fn parse_patent_family(
    reader: &mut XmlReader,
    members: &mut Vec<FamilyMember>,
) -> Result<(), XmlError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"family-member" => members.push(parse_family_member(reader)?),
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"patent-family" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn parse_family_member(reader: &mut XmlReader) -> Result<FamilyMember, XmlError> {
    let mut member = FamilyMember::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"publication-reference" => {
                    let data_format = require_attr(&e, "publication-reference", "data-format")?;
                    let document_id = parse_publication_reference(reader)?.ok_or(
                        XmlError::MissingElement {
                            parent: "publication-reference",
                            element: "document-id",
                        },
                    )?;
                    member.publication_references.push(PublicationReference {
                        data_format,
                        document_id,
                    });
                }
                _ => skip_element(reader)?,
            },
            // A self-closing publication-reference can have no document-id
            Event::Empty(e) if e.local_name().as_ref() == b"publication-reference" => {
                require_attr(&e, "publication-reference", "data-format")?;
                return Err(XmlError::MissingElement {
                    parent: "publication-reference",
                    element: "document-id",
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"family-member" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(member)
}

fn parse_publication_reference(reader: &mut XmlReader) -> Result<Option<DocumentId>, XmlError> {
    let mut document_id = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"document-id" => {
                    let id = parse_document_id(reader)?;
                    if document_id.is_none() {
                        document_id = Some(id);
                    }
                }
                _ => skip_element(reader)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"publication-reference" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(document_id)
}

/// Read an attribute by local name; absent or empty is an error.
fn require_attr(
    start: &BytesStart,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, XmlError> {
    for attr in start.attributes().flatten() {
        if attr.key.local_name().as_ref() == attribute.as_bytes() {
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            if value.is_empty() {
                break;
            }
            return Ok(value);
        }
    }
    Err(XmlError::MissingAttribute { element, attribute })
}

/// Read text content until the end of the current element, flattening any
/// nested markup.
fn read_text(reader: &mut XmlReader) -> Result<String, XmlError> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::Start(_) => text.push_str(&read_text(reader)?),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Consume the rest of the element whose Start event was just read.
fn skip_element(reader: &mut XmlReader) -> Result<(), XmlError> {
    let mut depth = 1u32;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}
