//! Entity builders: map a classified record document to an [`Entity`].
//!
//! One builder per kind, selected by [`build_entity`]. Builders work on the
//! already-parsed document only and never fail: a field that is missing
//! from the record stays unset.

use std::sync::LazyLock;

use regex::Regex;

use crate::classify::{issue_level, set_specs};
use crate::config::record_page_url;
use crate::mets;
use crate::types::{
    ArticleDetails, Author, Entity, EntityDetails, EntityKind, Identifier, IssueDetails,
    IssueLevel, JournalDetails, PageRange, Publisher, TitleInfo,
};
use crate::xml::{
    find_all_with_attribute, find_text, find_with_attribute, has_attribute_value, non_empty_text,
    own_text, Document, Node,
};

/// Leading year of a date value (`"1937-1954"` → `1937`).
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static LEADING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,4})").expect("valid regex"));

const PUBLISHER_ROLE: &str = "pbl";
const AUTHOR_ROLE: &str = "aut";
const MARC_RELATOR: &str = "marcrelator";

/// Build the entity for a classified record.
///
/// # Arguments
/// * `doc` - Parsed record document
/// * `kind` - Kind assigned by [`crate::classify::classify`]
/// * `identifier` - Identifier the record was requested with
/// * `base_url` - Base URL of the deployment, used for the landing page URL
///
/// # Returns
/// The entity and the identifiers of its child records, in document order.
/// The returned list equals `entity.children`.
pub fn build_entity(
    doc: &Document,
    kind: EntityKind,
    identifier: &Identifier,
    base_url: &str,
) -> (Entity, Vec<Identifier>) {
    let entity = match kind {
        EntityKind::Journal => build_journal(doc, identifier, base_url),
        EntityKind::Issue => build_issue(doc, identifier, base_url),
        EntityKind::Article => build_article(doc, identifier, base_url),
        EntityKind::Unknown => Entity::unknown(identifier.clone()),
    };
    tracing::debug!(
        identifier = %identifier,
        kind = %kind,
        children = entity.children.len(),
        "Built entity"
    );
    let children = entity.children.clone();
    (entity, children)
}

/// A record's own section and descriptive metadata.
struct RecordContext<'a> {
    doc: &'a Document,
    section: Option<Node<'a>>,
    mods: Option<Node<'a>>,
}

impl<'a> RecordContext<'a> {
    fn new(doc: &'a Document, identifier: &Identifier) -> Self {
        let section = mets::own_section(doc, identifier.as_str());
        if section.is_none() {
            tracing::warn!(identifier = %identifier, "No own METS section found");
        }
        Self {
            doc,
            section,
            mods: mets::descriptive_metadata(doc, section),
        }
    }
}

/// Attributes shared by all kinds.
fn build_common(
    ctx: &RecordContext<'_>,
    identifier: &Identifier,
    base_url: &str,
    details: EntityDetails,
) -> Entity {
    let mut entity = Entity::new(identifier.clone(), details);
    entity.set_spec = set_specs(ctx.doc);
    entity.url = record_page_url(base_url, identifier.as_str());
    entity.teaser_image_url = mets::teaser_image_url(ctx.doc);
    entity.files = mets::files(ctx.doc, ctx.section);
    entity.pdf_url = mets::pdf_url(&entity.files);
    entity.pages = mets::pages(ctx.doc, ctx.section);

    if let Some(section) = ctx.section {
        entity.label = non_empty_attribute(section, "label");
        entity.order = non_empty_attribute(section, "order");
        entity.children = mets::child_identifiers(section, identifier.as_str());
        entity.parent = mets::parent_identifier(section, identifier.as_str());
    }

    if let Some(mods) = ctx.mods {
        entity.titles = title_infos(mods);
        if let Some(primary) = entity.titles.first() {
            entity.title = primary.title.clone();
            entity.subtitle = primary.subtitle.clone();
        }
        entity.publication_date = publication_date(mods);
        entity.languages = languages(mods);
        entity.keywords = keywords(mods);
        entity.license = license(mods);
        entity.journal_label = host_title(mods).and_then(|info| info.label());
    }

    entity
}

/// Build a journal entity.
pub fn build_journal(doc: &Document, identifier: &Identifier, base_url: &str) -> Entity {
    let ctx = RecordContext::new(doc, identifier);
    let details = JournalDetails {
        publishers: ctx.mods.map(publishers).unwrap_or_default(),
    };
    let mut entity = build_common(&ctx, identifier, base_url, EntityDetails::Journal(details));
    // A journal is its own journal
    entity.journal_label = entity.titles.first().and_then(TitleInfo::label);
    entity
}

/// Build a volume or issue entity.
pub fn build_issue(doc: &Document, identifier: &Identifier, base_url: &str) -> Entity {
    let ctx = RecordContext::new(doc, identifier);
    let level = issue_level(&set_specs(doc));
    let details = IssueDetails {
        level,
        number: None,
        journal_id: None,
    };
    let mut entity = build_common(&ctx, identifier, base_url, EntityDetails::Issue(details));

    let number = ctx.mods.and_then(|mods| {
        let preferred = match level {
            IssueLevel::Volume => "volume",
            IssueLevel::Issue => "issue",
        };
        part_number(mods, preferred).or_else(|| any_part_number(mods))
    });
    let journal_id = entity.parent.clone();
    if let EntityDetails::Issue(details) = &mut entity.details {
        details.number = number;
        details.journal_id = journal_id;
    }
    entity
}

/// Build an article entity.
pub fn build_article(doc: &Document, identifier: &Identifier, base_url: &str) -> Entity {
    let ctx = RecordContext::new(doc, identifier);
    let details = match ctx.mods {
        Some(mods) => ArticleDetails {
            authors: authors(mods),
            page_range: page_range(mods),
            volume_number: part_number(mods, "volume"),
            issue_number: part_number(mods, "issue"),
        },
        None => ArticleDetails::default(),
    };
    build_common(&ctx, identifier, base_url, EntityDetails::Article(details))
}

fn non_empty_attribute(node: Node<'_>, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn title_info(node: Node<'_>) -> Option<TitleInfo> {
    let title = node.find_child("mods:title").and_then(non_empty_text);
    let title = match (node.find_child("mods:nonsort").and_then(non_empty_text), title) {
        (Some(non_sort), Some(title)) => Some(format!("{non_sort} {title}")),
        (_, title) => title,
    };
    let subtitle = node.find_child("mods:subtitle").and_then(non_empty_text);
    if title.is_none() && subtitle.is_none() {
        return None;
    }
    Some(TitleInfo {
        language: non_empty_attribute(node, "lang"),
        title,
        subtitle,
    })
}

/// Title infos directly below a MODS block, in document order.
fn title_infos(mods: Node<'_>) -> Vec<TitleInfo> {
    mods.find_children("mods:titleinfo")
        .filter_map(title_info)
        .collect()
}

/// Title of the outermost host publication.
fn host_title(mods: Node<'_>) -> Option<TitleInfo> {
    let mut current = mods;
    let mut title = None;
    while let Some(host) = current
        .find_children("mods:relateditem")
        .find(|item| has_attribute_value(*item, "type", "host"))
    {
        if let Some(info) = host.find_children("mods:titleinfo").find_map(title_info) {
            title = Some(info);
        }
        current = host;
    }
    title
}

fn leading_year(value: &str) -> Option<u32> {
    LEADING_YEAR
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Earliest publication date of the record, as written.
///
/// Dates marked `keyDate="yes"` are preferred; otherwise any issued date
/// counts. Dates of host publications are used only when the record has
/// none of its own.
fn publication_date(mods: Node<'_>) -> Option<String> {
    let own: Vec<Node<'_>> = mods.find_children("mods:origininfo").collect();
    let from_own = earliest_date(&own);
    from_own.or_else(|| earliest_date(&[mods]))
}

fn earliest_date(scopes: &[Node<'_>]) -> Option<String> {
    let candidates = |key_dates_only: bool| {
        scopes
            .iter()
            .flat_map(|scope| scope.descendants())
            .filter(|node| node.has_tag_name("mods:dateissued") || node.has_tag_name("mods:date"))
            .filter(move |node| !key_dates_only || has_attribute_value(*node, "keydate", "yes"))
            .filter_map(non_empty_text)
            .collect::<Vec<_>>()
    };

    let mut dates = candidates(true);
    if dates.is_empty() {
        dates = candidates(false);
    }
    // Undated values sort after every dated one; ties keep document order
    dates
        .into_iter()
        .enumerate()
        .min_by_key(|(index, date)| (leading_year(date).unwrap_or(u32::MAX), *index))
        .map(|(_, date)| date)
}

fn languages(mods: Node<'_>) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for term in mods
        .find_children("mods:language")
        .flat_map(|language| language.find_all("mods:languageterm"))
        .filter_map(non_empty_text)
    {
        if !languages.contains(&term) {
            languages.push(term);
        }
    }
    languages
}

fn keywords(mods: Node<'_>) -> Vec<String> {
    mods.find_children("mods:subject")
        .flat_map(|subject| subject.find_all("mods:topic"))
        .filter_map(non_empty_text)
        .collect()
}

fn license(mods: Node<'_>) -> Option<String> {
    let conditions: Vec<Node<'_>> = mods.find_children("mods:accesscondition").collect();
    conditions
        .iter()
        .find_map(|condition| non_empty_attribute(*condition, "xlink:href"))
        .or_else(|| conditions.iter().find_map(|condition| non_empty_text(*condition)))
}

/// Role terms of a `mods:name`, lower-cased.
fn role_terms(name: Node<'_>) -> impl Iterator<Item = (Option<String>, String)> + '_ {
    name.find_all("mods:roleterm").filter_map(|term| {
        let authority = term.attribute("authority").map(str::to_lowercase);
        non_empty_text(term).map(|text| (authority, text.to_lowercase()))
    })
}

fn has_role(name: Node<'_>, role: &str) -> bool {
    role_terms(name).any(|(authority, text)| {
        text == role && authority.as_deref().map_or(true, |a| a == MARC_RELATOR)
    })
}

fn name_part(name: Node<'_>, part_type: &str) -> Option<String> {
    find_with_attribute(name, "mods:namepart", "type", part_type).and_then(own_text)
}

fn publishers(mods: Node<'_>) -> Vec<Publisher> {
    let mut publishers: Vec<Publisher> = Vec::new();

    for name in mods
        .find_children("mods:name")
        .filter(|name| has_role(*name, PUBLISHER_ROLE))
    {
        let display = name
            .find_children("mods:namepart")
            .filter_map(own_text)
            .collect::<Vec<_>>()
            .join(", ");
        let display = Some(display)
            .filter(|d| !d.is_empty())
            .or_else(|| find_text(name, "mods:displayform"));
        if let Some(display) = display {
            publishers.push(Publisher {
                name: display,
                uri: non_empty_attribute(name, "valueuri"),
            });
        }
    }

    for text in mods
        .find_children("mods:origininfo")
        .flat_map(|info| info.find_children("mods:publisher"))
        .filter_map(non_empty_text)
    {
        if !publishers.iter().any(|p| p.name == text) {
            publishers.push(Publisher {
                name: text,
                uri: None,
            });
        }
    }

    publishers
}

fn authors(mods: Node<'_>) -> Vec<Author> {
    let mut authors: Vec<Author> = Vec::new();
    for name in find_all_with_attribute(mods, "mods:name", "type", "personal")
        .filter(|name| has_role(*name, AUTHOR_ROLE))
    {
        let given_name = name_part(name, "given").unwrap_or_default();
        let family_name = name_part(name, "family")
            .or_else(|| {
                name.find_children("mods:namepart")
                    .find(|part| part.attribute("type").is_none())
                    .and_then(own_text)
            })
            .unwrap_or_default();
        if given_name.is_empty() && family_name.is_empty() {
            continue;
        }
        let author = Author {
            given_name,
            family_name,
        };
        if !authors.contains(&author) {
            authors.push(author);
        }
    }
    authors
}

fn page_range(mods: Node<'_>) -> Option<PageRange> {
    let extent = mods
        .find_all("mods:extent")
        .find(|extent| {
            has_attribute_value(*extent, "unit", "pages") || has_attribute_value(*extent, "unit", "page")
        })?;
    let start = extent.find_child("mods:start").and_then(non_empty_text)?;
    let end = extent
        .find_child("mods:end")
        .and_then(non_empty_text)
        .unwrap_or_else(|| start.clone());
    Some(PageRange { start, end })
}

/// Number of the `mods:detail` of the given type, anywhere in the record.
fn part_number(mods: Node<'_>, detail_type: &str) -> Option<String> {
    find_all_with_attribute(mods, "mods:detail", "type", detail_type)
        .filter(|detail| detail.ancestors().any(|a| a.has_tag_name("mods:part")))
        .find_map(|detail| detail.find_child("mods:number").and_then(non_empty_text))
}

fn any_part_number(mods: Node<'_>) -> Option<String> {
    mods.find_children("mods:part")
        .flat_map(|part| part.find_children("mods:detail"))
        .find_map(|detail| detail.find_child("mods:number").and_then(non_empty_text))
}
