//! Listing page extractor
//!
//! Turns the HTML of one registry listing page into records. The listing is
//! the first `<table>` on the page, one equipment item per row:
//!
//! | Column | Content |
//! |--------|---------|
//! | 0 | Serial number, linking to `/e/{uuid}` |
//! | 1 | Equipment type |
//! | 2 | Address, ending in `..., city, county` |
//! | 3 | Operator: company name, then brand after a wide gap or line break |
//! | 4 | License number |
//! | 5 | Authorization date, `DD/MM/YYYY` |
//! | 6 | Expiry date, `DD/MM/YYYY` |
//! | 7 | Status |
//!
//! A row that cannot be mapped is reported and skipped; it never fails the
//! page.

use crate::model::{RegistryRecord, STATUS_DECOMMISSIONED, STATUS_IN_OPERATION};
use crate::ExtractError;
use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Bumped whenever the column layout above changes
pub const COLUMN_LAYOUT_VERSION: u32 = 1;

/// Cells a data row must have
pub const EXPECTED_COLUMNS: usize = 8;

const COL_SERIAL: usize = 0;
const COL_EQUIPMENT_TYPE: usize = 1;
const COL_ADDRESS: usize = 2;
const COL_OPERATOR: usize = 3;
const COL_LICENSE: usize = 4;
const COL_AUTHORIZATION_DATE: usize = 5;
const COL_EXPIRY_DATE: usize = 6;
const COL_STATUS: usize = 7;

/// Everything pulled out of one listing page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Records in page order
    pub records: Vec<RegistryRecord>,

    /// Rows that were skipped
    pub errors: Vec<ExtractError>,
}

impl Extraction {
    /// True when the page produced no records at all
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Extracts every record from a listing page
///
/// `page_url` is stored on each record as `onjn_list_url`; detail URLs are
/// built as `{details_base}/e/{uuid}`. A page with no table yields an empty
/// extraction.
pub fn extract_records(html: &str, page_url: &Url, details_base: &Url) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    let (Ok(table_selector), Ok(row_selector), Ok(cell_selector)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td"),
    ) else {
        return extraction;
    };

    let Some(table) = document.select(&table_selector).next() else {
        return extraction;
    };

    let today = Utc::now().date_naive();

    for (index, row) in table.select(&row_selector).enumerate() {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();

        // Header rows only have <th>
        if cells.is_empty() {
            continue;
        }

        match record_from_cells(&cells, index, page_url, details_base, today) {
            Ok(record) => extraction.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping row on {}: {}", page_url, e);
                extraction.errors.push(e);
            }
        }
    }

    extraction
}

fn record_from_cells(
    cells: &[ElementRef],
    row: usize,
    page_url: &Url,
    details_base: &Url,
    today: NaiveDate,
) -> Result<RegistryRecord, ExtractError> {
    if cells.len() < EXPECTED_COLUMNS {
        return Err(ExtractError::ColumnCount {
            row,
            found: cells.len(),
            expected: EXPECTED_COLUMNS,
        });
    }

    let serial_number = cell_text(&cells[COL_SERIAL]);
    if serial_number.is_empty() {
        return Err(ExtractError::MissingSerial { row });
    }

    let details_uuid = detail_link(&cells[COL_SERIAL]).and_then(|href| details_uuid(&href));
    let onjn_details_url = details_uuid
        .as_deref()
        .map(|uuid| details_url(details_base, uuid));

    let slot_address = cell_text(&cells[COL_ADDRESS]);
    let (city, county) = split_address(&slot_address);

    let (company_name, brand_name) = split_operator(&raw_text(&cells[COL_OPERATOR]));

    let expiry_date = parse_date(&cell_text(&cells[COL_EXPIRY_DATE]));

    Ok(RegistryRecord {
        serial_number,
        details_uuid,
        equipment_type: cell_text(&cells[COL_EQUIPMENT_TYPE]),
        company_name,
        brand_name,
        slot_address,
        city,
        county,
        license_number: cell_text(&cells[COL_LICENSE]),
        authorization_date: parse_date(&cell_text(&cells[COL_AUTHORIZATION_DATE])),
        expiry_date,
        status: normalize_status(&cell_text(&cells[COL_STATUS])),
        is_expired: RegistryRecord::compute_is_expired(expiry_date, today),
        onjn_list_url: page_url.to_string(),
        onjn_details_url,
        last_scraped_at: Utc::now(),
    })
}

/// Cell text with whitespace runs collapsed to single spaces
fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cell text as rendered, with `<br>` turned into a line break
///
/// Inline markup such as `<b>` or `<span>` adds no separator, and the text
/// keeps its original spacing.
fn raw_text(cell: &ElementRef) -> String {
    let mut text = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn detail_link(cell: &ElementRef) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    cell.select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Public detail page of one equipment item
pub fn details_url(base: &Url, uuid: &str) -> String {
    format!("{}/e/{}", base.as_str().trim_end_matches('/'), uuid)
}

/// The identifier after `/e/` in a detail link, relative or absolute
pub fn details_uuid(href: &str) -> Option<String> {
    let (_, rest) = href.rsplit_once("/e/")?;
    let uuid = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default()
        .trim();

    (!uuid.is_empty()).then(|| uuid.to_string())
}

/// Parses a strict `DD/MM/YYYY` date
///
/// Anything else, including placeholders like `-` and ISO dates, is absent.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let bytes = text.as_bytes();

    let well_formed = bytes.len() == 10
        && bytes[2] == b'/'
        && bytes[5] == b'/'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || i == 5 || b.is_ascii_digit());

    if !well_formed {
        return None;
    }

    NaiveDate::parse_from_str(text, "%d/%m/%Y").ok()
}

/// Splits the operator cell into company and brand
///
/// The two are separated by a line break or by two or more consecutive
/// whitespace characters. Text beyond the second segment is ignored.
pub fn split_operator(raw: &str) -> (Option<String>, Option<String>) {
    let mut segments = raw
        .lines()
        .flat_map(split_wide_gaps)
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty());

    let company = segments.next();
    let brand = segments.next();
    (company, brand)
}

fn split_wide_gaps(line: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut gap = String::new();

    for ch in line.chars() {
        if ch.is_whitespace() {
            gap.push(ch);
            continue;
        }

        if !gap.is_empty() {
            if gap.chars().count() >= 2 {
                segments.push(std::mem::take(&mut current));
            } else {
                current.push_str(&gap);
            }
            gap.clear();
        }
        current.push(ch);
    }

    segments.push(current);
    segments
}

/// City and county from the last two comma-separated address parts
///
/// A single part is taken as the city.
pub fn split_address(address: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    match parts.as_slice() {
        [] => (None, None),
        [city] => (Some(city.to_string()), None),
        [.., city, county] => (Some(city.to_string()), Some(county.to_string())),
    }
}

/// Maps status text onto the two canonical values
///
/// Unrecognized text is kept as-is after trimming.
pub fn normalize_status(raw: &str) -> String {
    let lowered = raw.to_lowercase();

    if lowered.contains("scos") {
        STATUS_DECOMMISSIONED.to_string()
    } else if lowered.contains("exploatare") {
        STATUS_IN_OPERATION.to_string()
    } else {
        raw.trim().to_string()
    }
}
