//! Navigation of the METS structure embedded in a VL record.
//!
//! A record describes itself and its neighbours in the logical structure
//! map. The division for the record itself (the "own section") carries the
//! descriptive metadata reference and the file pointers; divisions around
//! it point to parent and child records through `mets:mptr` elements.
//!
//! Scanned pages live in the physical structure map. The structure links
//! (`mets:smLink`) connect a logical division to its physical pages, and
//! each page points to one image file per resolution.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::identifier_from_url;
use crate::types::{FileRef, Identifier, Page};
use crate::xml::{find_ancestor, find_with_attribute, has_attribute_value, Document, Node};

const LOCTYPE_URL: &str = "URL";
const HREF: &str = "xlink:href";
const DOWNLOAD_GROUP: &str = "DOWNLOAD";
const TEASER_GROUP: &str = "TEASER";
const PDF_MIME_TYPE: &str = "application/pdf";
const LINK_FROM: &str = "xlink:from";
const LINK_TO: &str = "xlink:to";
const PHYSICAL_PREFIX: &str = "phys";

// Image file groups, one per resolution
const THUMBNAIL_GROUP: &str = "THUMBS";
const MIN_GROUP: &str = "MIN";
const DEFAULT_GROUP: &str = "DEFAULT";
const MAX_GROUP: &str = "MAX";

/// Digits of a string, in order (`"107 (1953)"` → `"1071953"`).
///
/// # Examples
/// ```
/// use vl_harvester::mets::digits_only;
///
/// assert_eq!(digits_only("log10771471"), "10771471");
/// assert_eq!(digits_only("1. Lieferung"), "1");
/// ```
#[must_use]
pub fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Whether a division `ID` names the given record.
///
/// VL prefixes logical division IDs with `log` (`log10771471`).
#[must_use]
pub fn section_id_matches(section_id: &str, identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    let section_id = section_id.trim();
    let without_prefix = section_id
        .get(..3)
        .filter(|prefix| prefix.eq_ignore_ascii_case("log"))
        .and_then(|_| section_id.get(3..));
    section_id == identifier
        || without_prefix == Some(identifier)
        || digits_only(section_id) == identifier
}

/// The logical structure map, or the first structure map if none is typed.
pub fn logical_struct_map(doc: &Document) -> Option<Node<'_>> {
    find_with_attribute(doc.root(), "mets:structmap", "type", "LOGICAL")
        .or_else(|| doc.find("mets:structmap"))
}

/// The division describing the record itself.
pub fn own_section<'a>(doc: &'a Document, identifier: &str) -> Option<Node<'a>> {
    let struct_map = logical_struct_map(doc)?;
    struct_map.find_all("mets:div").find(|div| {
        div.attribute("id")
            .is_some_and(|id| section_id_matches(id, identifier))
    })
}

/// Record named by a `mets:mptr` element, if it is a URL pointer.
pub fn pointer_target(mptr: Node<'_>) -> Option<Identifier> {
    if !has_attribute_value(mptr, "loctype", LOCTYPE_URL) {
        return None;
    }
    let href = mptr.attribute(HREF)?;
    let target = identifier_from_url(href);
    if target.is_none() {
        tracing::debug!(href = %href, "Pointer without recognizable identifier");
    }
    target.map(Identifier::new)
}

/// Record a division points to through a direct `mets:mptr` child.
fn division_pointer(div: Node<'_>) -> Option<Identifier> {
    div.find_children("mets:mptr").find_map(pointer_target)
}

/// Identifiers of the records contained in a section, in document order.
///
/// A child division with a pointer contributes the pointed-to record; a
/// division without one is a grouping level and is searched for pointers
/// itself. Duplicates and references back to `own` are dropped.
pub fn child_identifiers(section: Node<'_>, own: &str) -> Vec<Identifier> {
    let mut children = Vec::new();
    collect_children(section, own, &mut children);
    children
}

fn collect_children(div: Node<'_>, own: &str, out: &mut Vec<Identifier>) {
    for child in div.find_children("mets:div") {
        match division_pointer(child) {
            Some(id) => {
                if id != own && !out.contains(&id) {
                    out.push(id);
                }
            }
            None => collect_children(child, own, out),
        }
    }
}

/// Containing record: the pointer of the nearest enclosing division that has one.
pub fn parent_identifier(section: Node<'_>, own: &str) -> Option<Identifier> {
    let mut current = section;
    while let Some(div) = find_ancestor(current, "mets:div") {
        if let Some(parent) = division_pointer(div).filter(|id| id != own) {
            return Some(parent);
        }
        current = div;
    }
    None
}

/// The `mods:mods` block describing the record.
///
/// Uses the `DMDID` of the own section; without an own section the first
/// descriptive block of the document is used.
pub fn descriptive_metadata<'a>(doc: &'a Document, section: Option<Node<'a>>) -> Option<Node<'a>> {
    let Some(section) = section else {
        return doc.find("mods:mods");
    };
    let dmd_ids = section.attribute("dmdid")?;
    dmd_ids.split_whitespace().find_map(|dmd_id| {
        doc.find_all("mets:dmdsec")
            .find(|sec| sec.attribute("id").is_some_and(|id| id.trim() == dmd_id))
            .and_then(|sec| sec.find("mods:mods"))
    })
}

fn file_group<'a>(doc: &'a Document, usage: &str) -> Option<Node<'a>> {
    find_with_attribute(doc.root(), "mets:filegrp", "use", usage)
}

/// First URL location of a `mets:file`.
fn file_url(file: Node<'_>) -> Option<String> {
    file.find_all("mets:flocat")
        .filter(|loc| has_attribute_value(*loc, "loctype", LOCTYPE_URL))
        .find_map(|loc| loc.attribute(HREF))
        .map(|href| href.trim().to_string())
}

/// Parse a METS `CREATED` timestamp.
///
/// # Examples
/// ```
/// use vl_harvester::mets::parse_created;
///
/// assert!(parse_created("2019-03-26T11:43:55.432Z").is_some());
/// assert!(parse_created("yesterday").is_none());
/// ```
#[must_use]
pub fn parse_created(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

fn file_ref(file: Node<'_>) -> Option<FileRef> {
    let id = file.attribute("id")?.trim().to_string();
    let created = file.attribute("created").and_then(|value| {
        let parsed = parse_created(value);
        if parsed.is_none() {
            tracing::debug!(file = %id, created = %value, "Unparseable file creation date");
        }
        parsed
    });
    Some(FileRef {
        mime_type: file.attribute("mimetype").map(|m| m.trim().to_string()),
        size: file.attribute("size").and_then(|s| s.trim().parse().ok()),
        created,
        url: file_url(file),
        id,
    })
}

/// Download files belonging to the record.
///
/// With an own section, only the files it points to through `mets:fptr`
/// are returned. Without one, every file of the download group is.
pub fn files(doc: &Document, section: Option<Node<'_>>) -> Vec<FileRef> {
    let Some(group) = file_group(doc, DOWNLOAD_GROUP) else {
        return Vec::new();
    };
    let Some(section) = section else {
        return group.find_all("mets:file").filter_map(file_ref).collect();
    };
    section
        .find_children("mets:fptr")
        .filter_map(|fptr| fptr.attribute("fileid"))
        .filter_map(|file_id| {
            let file = group
                .find_all("mets:file")
                .find(|file| file.attribute("id") == Some(file_id));
            if file.is_none() {
                tracing::debug!(file_id = %file_id, "No download file with this ID");
            }
            file
        })
        .filter_map(file_ref)
        .collect()
}

/// URL of the first PDF among `files`.
#[must_use]
pub fn pdf_url(files: &[FileRef]) -> Option<String> {
    files
        .iter()
        .find(|file| {
            file.mime_type
                .as_deref()
                .is_some_and(|mime| mime.eq_ignore_ascii_case(PDF_MIME_TYPE))
        })
        .and_then(|file| file.url.clone())
}

/// URL of the record's teaser image.
pub fn teaser_image_url(doc: &Document) -> Option<String> {
    file_group(doc, TEASER_GROUP)?
        .find_all("mets:file")
        .find_map(file_url)
}

/// The physical structure map.
pub fn physical_struct_map(doc: &Document) -> Option<Node<'_>> {
    find_with_attribute(doc.root(), "mets:structmap", "type", "PHYSICAL")
}

/// Physical division IDs linked from a logical division, in link order.
pub fn linked_physical_ids<'a>(doc: &'a Document, logical_id: &str) -> Vec<&'a str> {
    let logical_id = logical_id.trim();
    let mut ids: Vec<&str> = Vec::new();
    for link in doc.find_all("mets:smlink") {
        if link.attribute(LINK_FROM).map(str::trim) != Some(logical_id) {
            continue;
        }
        if let Some(target) = link.attribute(LINK_TO).map(str::trim) {
            if !target.is_empty() && !ids.contains(&target) {
                ids.push(target);
            }
        }
    }
    ids
}

/// Scanned pages of the record's own section.
///
/// Without an own section there is no logical division to follow links
/// from, so no pages are returned.
pub fn pages(doc: &Document, section: Option<Node<'_>>) -> Vec<Page> {
    let Some(logical_id) = section.and_then(|section| section.attribute("id")) else {
        return Vec::new();
    };
    let Some(physical) = physical_struct_map(doc) else {
        return Vec::new();
    };
    linked_physical_ids(doc, logical_id)
        .into_iter()
        .filter_map(|physical_id| {
            let div = physical
                .find_all("mets:div")
                .find(|div| div.attribute("id").map(str::trim) == Some(physical_id));
            if div.is_none() {
                tracing::debug!(page = %physical_id, "Linked page missing from physical map");
            }
            div
        })
        .map(|div| page(doc, div))
        .collect()
}

/// Page ID without the `phys` prefix (`"phys9660761"` → `"9660761"`).
///
/// # Examples
/// ```
/// use vl_harvester::mets::page_id;
///
/// assert_eq!(page_id("phys9660761"), "9660761");
/// assert_eq!(page_id("9660761"), "9660761");
/// ```
#[must_use]
pub fn page_id(physical_id: &str) -> &str {
    let physical_id = physical_id.trim();
    physical_id
        .get(..PHYSICAL_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(PHYSICAL_PREFIX))
        .and_then(|_| physical_id.get(PHYSICAL_PREFIX.len()..))
        .unwrap_or(physical_id)
}

fn page(doc: &Document, div: Node<'_>) -> Page {
    let text_attribute = |name: &str| {
        div.attribute(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let mut page = Page {
        id: page_id(div.attribute("id").unwrap_or_default()).to_string(),
        label: text_attribute("label"),
        order: text_attribute("order"),
        thumbnail: None,
        image_min_resolution: None,
        image_default_resolution: None,
        image_max_resolution: None,
    };

    for file_id in div
        .find_children("mets:fptr")
        .filter_map(|fptr| fptr.attribute("fileid"))
    {
        let file_id = file_id.trim();
        let Some(file) = doc
            .find_all("mets:file")
            .find(|file| file.attribute("id").map(str::trim) == Some(file_id))
        else {
            tracing::debug!(page = %page.id, file_id = %file_id, "No image file with this ID");
            continue;
        };
        let usage = find_ancestor(file, "mets:filegrp")
            .and_then(|group| group.attribute("use"))
            .map(|usage| usage.trim().to_ascii_uppercase())
            .unwrap_or_default();
        let slot = match usage.as_str() {
            THUMBNAIL_GROUP => &mut page.thumbnail,
            MIN_GROUP => &mut page.image_min_resolution,
            DEFAULT_GROUP => &mut page.image_default_resolution,
            MAX_GROUP => &mut page.image_max_resolution,
            _ => continue,
        };
        if slot.is_none() {
            *slot = file_ref(file);
        }
    }
    page
}
