//! End-to-end resolution tests.
//!
//! Runs the engine against recorded VL responses for the journal
//! *Decheniana* (10688403) and against small synthetic record sets for
//! sharing, cycles and failure handling.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use vl_harvester::config::identifier_from_url;
use vl_harvester::types::{Author, IssueLevel, PageRange};
use vl_harvester::{
    Entity, EntityKind, FailurePolicy, Fetch, HarvesterConfig, HarvesterError, Identifier,
    ResolvedGraph, Stage, TransportError, VisualLibrary,
};

const BASE_URL: &str = "https://sammlungen.ub.uni-frankfurt.de/oai/";
const JOURNAL: &str = "10688403";
const VOLUME: &str = "10771471";
const ISSUE: &str = "10771472";
const ARTICLE: &str = "10902187";
const MALFORMED_ARTICLE: &str = "10902188";

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_fixture(name: &str) -> String {
    let path = fixture_path(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

/// Serves bodies by identifier and counts requests per identifier.
///
/// Unknown identifiers answer 404.
#[derive(Default)]
struct RecordingFetcher {
    bodies: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl RecordingFetcher {
    /// All records of the Decheniana fixture set.
    fn decheniana() -> Self {
        [JOURNAL, VOLUME, ISSUE, ARTICLE, MALFORMED_ARTICLE]
            .into_iter()
            .fold(Self::default(), |fetcher, id| {
                fetcher.with(id, load_fixture(&format!("vl/{id}.xml")))
            })
    }

    fn with(mut self, id: &str, body: String) -> Self {
        self.bodies.insert(id.to_string(), body);
        self
    }

    fn without(mut self, id: &str) -> Self {
        self.bodies.remove(id);
        self
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl Fetch for RecordingFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let id = identifier_from_url(url).unwrap_or_default();
        *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;
        self.bodies
            .get(&id)
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| TransportError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Minimal VL record: header marker plus a logical division with pointers.
fn record(id: &str, set_spec: &str, children: &[&str]) -> String {
    let pointers: String = children
        .iter()
        .map(|child| {
            format!(
                r#"<mets:div ID="log{child}" TYPE="article"><mets:mptr LOCTYPE="URL" xlink:href="{BASE_URL}?verb=GetRecord&amp;metadataPrefix=mets&amp;identifier={child}"/></mets:div>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH><GetRecord><record>
<header><identifier>{id}</identifier><setSpec>{set_spec}</setSpec></header>
<metadata><mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
<mets:structMap TYPE="LOGICAL"><mets:div ID="log{id}" LABEL="Record {id}">{pointers}</mets:div></mets:structMap>
</mets:mets></metadata></record></GetRecord></OAI-PMH>"#
    )
}

/// Journal J1 with issues I1 and I2; article A1 appears in both issues.
fn shared_article_records() -> RecordingFetcher {
    RecordingFetcher::default()
        .with("J1", record("J1", "periodical", &["I1", "I2"]))
        .with("I1", record("I1", "journal_issue", &["A1", "A2"]))
        .with("I2", record("I2", "journal_issue", &["A1"]))
        .with("A1", record("A1", "article", &[]))
        .with("A2", record("A2", "article", &[]))
}

/// Engine sharing `fetcher` with the test, so request counts stay visible.
fn library(fetcher: &Arc<RecordingFetcher>) -> VisualLibrary {
    VisualLibrary::with_fetcher(HarvesterConfig::new(BASE_URL), Arc::clone(fetcher)).unwrap()
}

fn resolve_decheniana() -> (ResolvedGraph, Arc<RecordingFetcher>) {
    let fetcher = Arc::new(RecordingFetcher::decheniana());
    let graph = library(&fetcher).get_element_for_id(JOURNAL).unwrap();
    (graph, fetcher)
}

/// Identifier and kind of each resolved child of `id`, in document order.
fn children_of<'a>(graph: &'a ResolvedGraph, id: &str) -> Vec<(&'a str, EntityKind)> {
    graph
        .children(id)
        .map(|node| {
            let entity = node.entity().unwrap();
            (entity.id.as_str(), entity.kind())
        })
        .collect()
}

fn ids(graph: &ResolvedGraph) -> Vec<&str> {
    graph.walk().iter().map(|node| node.identifier().as_str()).collect()
}

#[test]
fn test_journal_graph_structure() {
    let (graph, fetcher) = resolve_decheniana();

    assert!(graph.is_complete());
    assert_eq!(graph.len(), 5);
    assert_eq!(
        ids(&graph),
        vec![JOURNAL, VOLUME, ARTICLE, MALFORMED_ARTICLE, ISSUE]
    );
    for id in [JOURNAL, VOLUME, ISSUE, ARTICLE, MALFORMED_ARTICLE] {
        assert_eq!(fetcher.calls_for(id), 1, "record {id} fetched more than once");
    }
}

#[test]
fn test_classification_of_every_record() {
    let (graph, _) = resolve_decheniana();

    let kind = |id: &str| graph.entity(id).map(Entity::kind);
    assert_eq!(kind(JOURNAL), Some(EntityKind::Journal));
    assert_eq!(kind(VOLUME), Some(EntityKind::Issue));
    assert_eq!(kind(ISSUE), Some(EntityKind::Issue));
    assert_eq!(kind(ARTICLE), Some(EntityKind::Article));
    assert_eq!(kind(MALFORMED_ARTICLE), Some(EntityKind::Article));

    assert_eq!(
        graph.entity(VOLUME).unwrap().issue().unwrap().level,
        IssueLevel::Volume
    );
    assert_eq!(
        graph.entity(ISSUE).unwrap().issue().unwrap().level,
        IssueLevel::Issue
    );
}

#[test]
fn test_journal_attributes() {
    let (graph, _) = resolve_decheniana();
    let journal = graph.root();

    assert_eq!(journal.id, JOURNAL);
    assert_eq!(journal.set_spec, vec!["ubffm", "biodiv", "periodical"]);
    assert_eq!(journal.title.as_deref(), Some("Decheniana"));
    assert_eq!(
        journal.journal_label.as_deref(),
        Some("Decheniana: Verhandlungen des Naturhistorischen Vereins der Rheinlande und Westfalens")
    );
    assert_eq!(journal.publication_date.as_deref(), Some("1937-1954"));
    assert_eq!(journal.languages, vec!["ger"]);
    assert_eq!(
        journal.license.as_deref(),
        Some("https://creativecommons.org/licenses/by-nc-sa/4.0/")
    );
    assert_eq!(
        journal.url.as_deref(),
        Some("https://sammlungen.ub.uni-frankfurt.de/10688403")
    );
    assert_eq!(
        journal.teaser_image_url.as_deref(),
        Some("https://sammlungen.ub.uni-frankfurt.de/download/webcache/304/10688404")
    );
    assert!(journal.parent.is_none());
    assert_eq!(
        journal.children,
        vec![Identifier::from(VOLUME), Identifier::from(ISSUE)]
    );

    let publishers = &journal.journal().unwrap().publishers;
    assert_eq!(publishers.len(), 1);
    assert_eq!(
        publishers[0].name,
        "Naturhistorischer Verein der Rheinlande und Westfalens"
    );
    assert_eq!(
        publishers[0].uri.as_deref(),
        Some("http://d-nb.info/gnd/40094-4")
    );
}

#[test]
fn test_volume_attributes() {
    let (graph, _) = resolve_decheniana();
    let volume = graph.entity(VOLUME).unwrap();

    assert_eq!(volume.title.as_deref(), Some("95 A (1937)"));
    assert_eq!(volume.label.as_deref(), Some("95 A (1937)"));
    assert_eq!(volume.order.as_deref(), Some("1"));
    assert_eq!(volume.publication_date.as_deref(), Some("1937"));
    assert_eq!(volume.keywords, vec!["Rheinland", "Geologie"]);
    assert_eq!(
        volume.journal_label.as_deref(),
        Some("Decheniana: Verhandlungen des Naturhistorischen Vereins der Rheinlande und Westfalens")
    );
    assert_eq!(volume.parent, Some(Identifier::from(JOURNAL)));

    let details = volume.issue().unwrap();
    assert_eq!(details.number.as_deref(), Some("95 A"));
    assert_eq!(details.journal_id, Some(Identifier::from(JOURNAL)));

    assert_eq!(volume.files.len(), 1);
    assert_eq!(volume.files[0].size, Some(48_235_520));
    assert_eq!(
        volume.pdf_url.as_deref(),
        Some("https://sammlungen.ub.uni-frankfurt.de/biodiv/download/pdf/10771471")
    );
    // Articles are nested in a grouping division without a pointer
    assert_eq!(
        volume.children,
        vec![Identifier::from(ARTICLE), Identifier::from(MALFORMED_ARTICLE)]
    );
}

#[test]
fn test_article_attributes() {
    let (graph, _) = resolve_decheniana();
    let article = graph.entity(ARTICLE).unwrap();

    assert!(article.is_leaf());
    assert_eq!(
        article.title.as_deref(),
        Some("Diluvialer Gehängeschutt südlich von Bonn")
    );
    assert_eq!(article.subtitle.as_deref(), Some("mit 3 Textfiguren"));
    assert_eq!(article.title_in("eng"), Some("Diluvial scree south of Bonn"));
    assert_eq!(article.order.as_deref(), Some("12"));
    assert_eq!(article.parent, Some(Identifier::from(VOLUME)));
    assert_eq!(
        article.license.as_deref(),
        Some("https://rightsstatements.org/vocab/InC/1.0/")
    );
    assert_eq!(
        article.pdf_url.as_deref(),
        Some("https://sammlungen.ub.uni-frankfurt.de/biodiv/download/pdf/10902187")
    );
    assert!(article.files[0].created.is_some());

    let details = article.article().unwrap();
    assert_eq!(
        details.authors,
        vec![Author {
            given_name: "Max".to_string(),
            family_name: "Richter".to_string(),
        }]
    );
    assert_eq!(
        details.page_range,
        Some(PageRange {
            start: "283".to_string(),
            end: "287".to_string(),
        })
    );
    assert_eq!(details.volume_number.as_deref(), Some("95 A"));
    assert!(details.issue_number.is_none());
}

#[test]
fn test_article_pages() {
    let (graph, _) = resolve_decheniana();
    let article = graph.entity(ARTICLE).unwrap();

    let pages: Vec<(&str, Option<&str>, Option<&str>)> = article
        .pages
        .iter()
        .map(|page| (page.id.as_str(), page.label.as_deref(), page.order.as_deref()))
        .collect();
    assert_eq!(
        pages,
        vec![
            ("10769418", Some("Seite 283"), Some("11")),
            ("10769419", Some("Seite 284"), Some("12")),
        ]
    );

    let page = article.page("phys10769418").unwrap();
    let resolutions = [
        (&page.thumbnail, 128),
        (&page.image_min_resolution, 600),
        (&page.image_default_resolution, 1000),
        (&page.image_max_resolution, 1504),
    ];
    for (file, width) in resolutions {
        let file = file.as_ref().unwrap();
        assert_eq!(
            file.url,
            Some(format!(
                "https://sammlungen.ub.uni-frankfurt.de/download/webcache/{width}/10769418"
            ))
        );
        assert_eq!(file.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(
            file.created.map(|created| created.date_naive().to_string()),
            Some("2018-05-08".to_string())
        );
    }

    // Graph-wide lookup finds the page on the article that links it
    let (owner, found) = graph.page("10769419").unwrap();
    assert_eq!(owner.id, ARTICLE);
    assert_eq!(found.label.as_deref(), Some("Seite 284"));
}

#[test]
fn test_records_without_page_links_have_no_pages() {
    let (graph, _) = resolve_decheniana();
    for id in [JOURNAL, VOLUME, ISSUE, MALFORMED_ARTICLE] {
        assert!(graph.entity(id).unwrap().pages.is_empty(), "{id} has pages");
    }
    assert!(graph.page("10769420").is_none());
}

#[test]
fn test_partial_record_leaves_fields_unset() {
    let (graph, _) = resolve_decheniana();
    let issue = graph.entity(ISSUE).unwrap();

    assert_eq!(issue.title.as_deref(), Some("95 B (1937)"));
    assert!(issue.publication_date.is_none());
    assert!(issue.languages.is_empty());
    assert!(issue.license.is_none());
    assert!(issue.files.is_empty());
    assert!(issue.pdf_url.is_none());
    assert!(issue.is_leaf());
    assert!(issue.issue().unwrap().number.is_none());
    assert_eq!(
        issue.issue().unwrap().journal_id,
        Some(Identifier::from(JOURNAL))
    );
}

#[test]
fn test_malformed_record_still_resolves() {
    let (graph, _) = resolve_decheniana();
    let article = graph.entity(MALFORMED_ARTICLE).unwrap();

    assert!(article
        .title
        .as_deref()
        .is_some_and(|title| title.starts_with("Über einige Moose")));
    assert_eq!(article.label.as_deref(), Some("Über einige Moose"));
    assert_eq!(article.parent, Some(Identifier::from(VOLUME)));

    let details = article.article().unwrap();
    assert_eq!(details.authors.len(), 1);
    assert_eq!(details.authors[0].given_name, "Anna");
    assert_eq!(
        details.authors[0],
        Author {
            given_name: "Anna".to_string(),
            family_name: "Becker".to_string(),
        }
    );
    assert_eq!(
        details.page_range,
        Some(PageRange {
            start: "301".to_string(),
            end: "301".to_string(),
        })
    );
}

#[test]
fn test_resolving_from_a_volume() {
    let fetcher = Arc::new(RecordingFetcher::decheniana());
    let graph = library(&fetcher).get_element_for_id(VOLUME).unwrap();

    // The parent is named but never fetched
    assert_eq!(graph.root().parent, Some(Identifier::from(JOURNAL)));
    assert!(!graph.contains(JOURNAL));
    assert_eq!(fetcher.calls_for(JOURNAL), 0);
    assert_eq!(graph.len(), 3);
}

#[test]
fn test_leaf_article_needs_one_fetch() {
    let fetcher = Arc::new(RecordingFetcher::decheniana());
    let graph = library(&fetcher).get_element_for_id(ARTICLE).unwrap();

    assert_eq!(graph.len(), 1);
    assert!(graph.root().is_leaf());
    assert_eq!(fetcher.total_calls(), 1);
}

#[test]
fn test_raw_access_fetches_only_the_record() {
    let fetcher = Arc::new(RecordingFetcher::decheniana());
    let doc = library(&fetcher).get_data_for_id(JOURNAL).unwrap();

    assert_eq!(doc.find("identifier").unwrap().text(), Some(JOURNAL));
    assert_eq!(doc.find_all("mets:mptr").count(), 2);
    assert_eq!(fetcher.total_calls(), 1);
}

#[test]
fn test_oai_error_response_is_fetch_error() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let err = library(&fetcher)
        .get_element_from_xml("4711", load_fixture("oai-error.xml"))
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Fetch));
    assert_eq!(err.identifier(), Some("4711"));
    match err {
        HarvesterError::Fetch {
            source: TransportError::Oai { code, message },
            ..
        } => {
            assert_eq!(code, "idDoesNotExist");
            assert!(message.starts_with("The value of the identifier argument is unknown"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fetcher.total_calls(), 0);
}

#[test]
fn test_nonexistent_child_is_failed_node() {
    let fetcher = Arc::new(
        RecordingFetcher::default()
            .with("I1", record("I1", "journal_issue", &["A1", "A9"]))
            .with("A1", record("A1", "article", &[]))
            .with("A9", load_fixture("oai-error.xml")),
    );
    let graph = library(&fetcher).get_element_for_id("I1").unwrap();

    assert_eq!(graph.len(), 3);
    assert!(!graph.is_complete());
    assert!(graph.entity("A9").is_none());

    let failures: Vec<_> = graph.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].identifier, "A9");
    assert_eq!(failures[0].stage(), Some(Stage::Fetch));
    assert!(matches!(
        failures[0].error,
        HarvesterError::Fetch {
            source: TransportError::Oai { .. },
            ..
        }
    ));
}

#[test]
fn test_shared_article_is_one_node() {
    let fetcher = Arc::new(shared_article_records());
    let graph = library(&fetcher).get_element_for_id("J1").unwrap();

    assert_eq!(graph.len(), 5);
    assert!(graph.is_complete());
    assert_eq!(fetcher.calls_for("A1"), 1);
    assert_eq!(fetcher.total_calls(), 5);

    assert_eq!(
        children_of(&graph, "J1"),
        vec![("I1", EntityKind::Issue), ("I2", EntityKind::Issue)]
    );
    assert_eq!(
        children_of(&graph, "I1"),
        vec![("A1", EntityKind::Article), ("A2", EntityKind::Article)]
    );
    assert_eq!(children_of(&graph, "I2"), vec![("A1", EntityKind::Article)]);
    assert!(children_of(&graph, "A1").is_empty());
    assert!(children_of(&graph, "A2").is_empty());

    let from_i1 = graph.children("I1").next().unwrap().entity().unwrap();
    let from_i2 = graph.children("I2").next().unwrap().entity().unwrap();
    assert_eq!(from_i1.id, "A1");
    assert!(std::ptr::eq(from_i1, from_i2));

    let referrers: Vec<&str> = graph
        .referrers("A1")
        .iter()
        .map(|entity| entity.id.as_str())
        .collect();
    assert_eq!(referrers, vec!["I1", "I2"]);
}

#[test]
fn test_cycle_terminates() {
    let fetcher = Arc::new(
        RecordingFetcher::default()
            .with("A", record("A", "journal_issue", &["B"]))
            .with("B", record("B", "journal_issue", &["A"])),
    );
    let graph = library(&fetcher).get_element_for_id("A").unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(fetcher.calls_for("A"), 1);
    assert_eq!(fetcher.calls_for("B"), 1);

    let back = graph.children("B").next().unwrap().entity().unwrap();
    assert!(std::ptr::eq(back, graph.root()));
    assert_eq!(ids(&graph), vec!["A", "B"]);
}

#[test]
fn test_self_reference_is_dropped() {
    let fetcher = Arc::new(RecordingFetcher::default().with("S", record("S", "journal_issue", &["S"])));
    let graph = library(&fetcher).get_element_for_id("S").unwrap();

    assert!(graph.root().is_leaf());
    assert_eq!(fetcher.total_calls(), 1);
}

#[test]
fn test_missing_child_recorded_as_failure() {
    let fetcher = Arc::new(RecordingFetcher::decheniana().without(ISSUE));
    let graph = library(&fetcher).get_element_for_id(JOURNAL).unwrap();

    assert_eq!(graph.len(), 5);
    assert!(!graph.is_complete());
    let failures: Vec<_> = graph.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].identifier, ISSUE);
    assert_eq!(failures[0].stage(), Some(Stage::Fetch));
    // Siblings resolve regardless
    assert_eq!(
        graph.entity(MALFORMED_ARTICLE).map(Entity::kind),
        Some(EntityKind::Article)
    );
}

#[test]
fn test_unparseable_child_recorded_as_failure() {
    let fetcher = Arc::new(RecordingFetcher::decheniana().with(ISSUE, String::new()));
    let graph = library(&fetcher).get_element_for_id(JOURNAL).unwrap();

    let failure = graph.get(ISSUE).unwrap().failure().unwrap();
    assert_eq!(failure.stage(), Some(Stage::Parse));
}

#[test]
fn test_fail_fast_returns_first_child_error() {
    let fetcher = Arc::new(RecordingFetcher::decheniana().without(ARTICLE));
    let config = HarvesterConfig::new(BASE_URL).with_failure_policy(FailurePolicy::FailFast);
    let err = VisualLibrary::with_fetcher(config, fetcher)
        .unwrap()
        .get_element_for_id(JOURNAL)
        .unwrap_err();

    assert_eq!(err.identifier(), Some(ARTICLE));
    assert!(matches!(
        err,
        HarvesterError::Fetch {
            source: TransportError::Status { status: 404, .. },
            ..
        }
    ));
}

#[test]
fn test_graph_serializes_to_json() {
    let fetcher = Arc::new(RecordingFetcher::decheniana().without(ISSUE));
    let graph = library(&fetcher).get_element_for_id(VOLUME).unwrap();
    let json = serde_json::to_value(&graph).unwrap();

    assert_eq!(json["root"]["id"], VOLUME);
    assert_eq!(json["root"]["kind"], "issue");
    assert_eq!(json["root"]["level"], "volume");
    assert_eq!(json["root"]["children"][0], ARTICLE);

    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["status"], "resolved");
    assert_eq!(nodes[0]["node"]["kind"], "article");
    assert_eq!(nodes[0]["node"]["authors"][0]["family_name"], "Richter");
    assert_eq!(nodes[0]["node"]["pages"][0]["id"], "10769418");
    assert_eq!(nodes[0]["node"]["pages"][0]["label"], "Seite 283");
}

#[test]
fn test_failed_node_serializes_error_message() {
    let fetcher = Arc::new(RecordingFetcher::decheniana().without(ARTICLE));
    let graph = library(&fetcher).get_element_for_id(VOLUME).unwrap();
    let json = serde_json::to_value(&graph).unwrap();

    let failed = &json["nodes"][0];
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["node"]["identifier"], ARTICLE);
    assert!(failed["node"]["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to fetch record 10902187"));
}
