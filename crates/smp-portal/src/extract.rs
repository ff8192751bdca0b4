use scraper::{ElementRef, Html, Selector};

use crate::types::{Commodity, ExtractionRecord};

const HEADINGS: &str = "h1, h2, h3, h4, h5, h6";
const CONTAINER_CLASSES: &[&str] = &["card-body", "card", "panel-body", "panel"];
const RECORD_CELLS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Section '{0}' not found")]
    SectionNotFound(String),
    #[error("Section '{0}' is not inside a card or panel")]
    ContainerMissing(String),
    #[error("No table found in '{0}' section")]
    TableMissing(String),
    #[error("No tbody found in '{0}' table")]
    BodyMissing(String),
    #[error("No data rows found in '{0}' table")]
    EmptyTable(String),
    #[error("Incomplete row in '{title}' table: {cells} of 6 cells")]
    IncompleteRow { title: String, cells: usize },
}

/// Minimal DOM navigation needed to pull a table out of a titled section.
pub trait TreeQuery {
    type Node<'a>: Copy
    where
        Self: 'a;

    /// First element matching `selector` whose text contains `needle`.
    fn find_by_text<'a>(&'a self, selector: &str, needle: &str) -> Option<Self::Node<'a>>;

    /// Nearest ancestor of `node` carrying any of `classes`.
    fn find_ancestor_by_class<'a>(
        &'a self,
        node: Self::Node<'a>,
        classes: &[&str],
    ) -> Option<Self::Node<'a>>;

    /// Descendants of `node` with tag `tag`, in document order.
    fn find_descendants_by_tag<'a>(
        &'a self,
        node: Self::Node<'a>,
        tag: &str,
    ) -> Vec<Self::Node<'a>>;

    fn find_descendant_by_tag<'a>(
        &'a self,
        node: Self::Node<'a>,
        tag: &str,
    ) -> Option<Self::Node<'a>> {
        self.find_descendants_by_tag(node, tag).into_iter().next()
    }

    fn text<'a>(&'a self, node: Self::Node<'a>) -> String;
}

impl TreeQuery for Html {
    type Node<'a> = ElementRef<'a>;

    fn find_by_text<'a>(&'a self, selector: &str, needle: &str) -> Option<ElementRef<'a>> {
        let selector = Selector::parse(selector).ok()?;
        self.select(&selector)
            .find(|element| element.text().collect::<String>().contains(needle))
    }

    fn find_ancestor_by_class<'a>(
        &'a self,
        node: ElementRef<'a>,
        classes: &[&str],
    ) -> Option<ElementRef<'a>> {
        node.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().classes().any(|c| classes.contains(&c)))
    }

    fn find_descendants_by_tag<'a>(
        &'a self,
        node: ElementRef<'a>,
        tag: &str,
    ) -> Vec<ElementRef<'a>> {
        let Ok(selector) = Selector::parse(tag) else {
            return Vec::new();
        };
        node.select(&selector).collect()
    }

    fn text<'a>(&'a self, node: ElementRef<'a>) -> String {
        node.text().collect()
    }
}

/// Last body row of the table in the section headed `title`.
///
/// The portal renders rows oldest first, so the last row is the latest
/// observation. Cell text is only trimmed.
pub fn latest_row<D: TreeQuery>(
    document: &D,
    title: &str,
) -> Result<ExtractionRecord, ExtractionError> {
    let heading = document
        .find_by_text(HEADINGS, title)
        .ok_or_else(|| ExtractionError::SectionNotFound(title.to_string()))?;
    let container = document
        .find_ancestor_by_class(heading, CONTAINER_CLASSES)
        .ok_or_else(|| ExtractionError::ContainerMissing(title.to_string()))?;
    let table = document
        .find_descendant_by_tag(container, "table")
        .ok_or_else(|| ExtractionError::TableMissing(title.to_string()))?;
    let body = document
        .find_descendant_by_tag(table, "tbody")
        .ok_or_else(|| ExtractionError::BodyMissing(title.to_string()))?;
    let row = document
        .find_descendants_by_tag(body, "tr")
        .pop()
        .ok_or_else(|| ExtractionError::EmptyTable(title.to_string()))?;

    let cells: Vec<String> = document
        .find_descendants_by_tag(row, "td")
        .into_iter()
        .map(|cell| document.text(cell).trim().to_string())
        .collect();

    if cells.len() < RECORD_CELLS {
        return Err(ExtractionError::IncompleteRow {
            title: title.to_string(),
            cells: cells.len(),
        });
    }

    let mut cells = cells.into_iter();
    let mut next = || cells.next().unwrap_or_default();
    Ok(ExtractionRecord {
        serial: next(),
        date: next(),
        received_quantity: next(),
        present_stock: next(),
        consumption: next(),
        remaining_balance: next(),
    })
}

/// Like [`latest_row`], but a missing or malformed section is never an error:
/// every [`ExtractionError`], including [`ExtractionError::IncompleteRow`], is
/// logged at warn level and reported as `None`.
pub fn extract_latest<D: TreeQuery>(document: &D, title: &str) -> Option<ExtractionRecord> {
    match latest_row(document, title) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

/// Latest milk and biscuit records from a detail-report fragment.
pub fn extract_commodities(html: &str) -> (Option<ExtractionRecord>, Option<ExtractionRecord>) {
    let document = Html::parse_document(html);
    (
        extract_latest(&document, Commodity::Milk.section_title()),
        extract_latest(&document, Commodity::Biscuit.section_title()),
    )
}
