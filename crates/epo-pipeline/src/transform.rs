//! CSV row synthesis from parsed exchange documents

use std::collections::BTreeSet;

use crate::models::ExchangeDocument;

/// Classification scheme selected for the `cpc_list` column.
const CPC_SCHEME: &str = "CPCI";

/// Family member format selected for the `family_patents` column.
const FAMILY_FORMAT: &str = "docdb";

/// One CSV row: patent_id, status, cpc_list, citations, family_patents.
pub fn csv_row(doc: &ExchangeDocument) -> [String; 5] {
    let patent_id = doc.patent_id();
    [
        patent_id.clone(),
        doc.status.clone(),
        cpc_list(doc),
        citations(doc),
        family_patents(doc, &patent_id),
    ]
}

/// CPCI symbols, deduplicated and sorted, `;`-joined.
fn cpc_list(doc: &ExchangeDocument) -> String {
    let symbols: BTreeSet<&str> = doc
        .classifications
        .iter()
        .filter(|c| c.scheme == CPC_SCHEME)
        .map(|c| c.symbol.as_str())
        .collect();
    join(symbols.into_iter())
}

/// Citations with a cited id, in file order, `"{id} ({cat,…})"` each.
fn citations(doc: &ExchangeDocument) -> String {
    join(doc.citations.iter().filter_map(|c| {
        if c.cited_id.is_empty() {
            return None;
        }
        Some(format!("{} ({})", c.cited_id, c.categories.join(",")))
    }))
}

/// docdb family ids excluding the document's own, deduplicated and sorted.
fn family_patents(doc: &ExchangeDocument, own_id: &str) -> String {
    let ids: BTreeSet<String> = doc
        .family_members
        .iter()
        .flat_map(|m| m.publication_references.iter())
        .filter(|r| r.data_format == FAMILY_FORMAT)
        .map(|r| r.document_id.composed())
        .filter(|id| id != own_id)
        .collect();
    join(ids.into_iter())
}

fn join<I, S>(parts: I) -> String
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(";")
}
