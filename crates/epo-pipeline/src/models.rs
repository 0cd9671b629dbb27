//! Catalog and document models

use std::path::PathBuf;

use serde::Deserialize;

/// One product of the bulk-data catalog, as served by
/// `GET {base_url}/products/{product_id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: u32,
    #[serde(default)]
    pub delivery_name: String,
    #[serde(default)]
    pub delivery_expiry_datetime: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: u32,
    pub item_name: String,
    /// Human-readable size string, e.g. "12.3 MB"
    #[serde(default)]
    pub file_size: String,
    /// Hex SHA-1 of the item
    #[serde(default)]
    pub file_checksum: String,
    #[serde(default)]
    pub item_publication_datetime: Option<String>,
}

/// One file to download, resolved from the catalog. Built once, consumed
/// once by the fetcher, never mutated.
#[derive(Debug, Clone)]
pub struct DownloadDescriptor {
    pub filename: String,
    pub file_path: PathBuf,
    pub expected_size: u64,
    pub checksum: String,
    pub url: String,
}

/// One `<exchange-document>` element: a single patent publication.
#[derive(Debug, Default, Clone)]
pub struct ExchangeDocument {
    pub country: String,
    pub doc_number: String,
    pub kind: String,
    pub status: String,
    pub classifications: Vec<PatentClassification>,
    pub citations: Vec<Citation>,
    pub family_members: Vec<FamilyMember>,
}

impl ExchangeDocument {
    /// Composed key: country + doc-number + kind.
    pub fn patent_id(&self) -> String {
        format!("{}{}{}", self.country, self.doc_number, self.kind)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PatentClassification {
    pub scheme: String,
    pub symbol: String,
}

#[derive(Debug, Default, Clone)]
pub struct Citation {
    /// Composed cited document id; empty when the citation has none.
    pub cited_id: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct FamilyMember {
    pub publication_references: Vec<PublicationReference>,
}

#[derive(Debug, Default, Clone)]
pub struct PublicationReference {
    pub data_format: String,
    pub document_id: DocumentId,
}

#[derive(Debug, Default, Clone)]
pub struct DocumentId {
    pub country: String,
    pub doc_number: String,
    pub kind: String,
}

impl DocumentId {
    pub fn composed(&self) -> String {
        format!("{}{}{}", self.country, self.doc_number, self.kind)
    }
}
