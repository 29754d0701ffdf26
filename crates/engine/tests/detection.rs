// ABOUTME: End-to-end detection tests over HTML fixtures and small inline documents.
// ABOUTME: Covers idempotence, fallback order, threshold monotonicity, negative filters and label proximity.

use adsift_engine::detect::container::find_containers;
use adsift_engine::detect::debug::RuleStatus;
use adsift_engine::{
    from_path, AdField, ConfigValidator, ContainerRule, Detector, DetectorOptions, DocumentTree,
    FieldRule, HtmlTree, NegativeFilters, RuleSet, RuleSetRegistry, ValidationRule,
};
use pretty_assertions::assert_eq;
use std::fs;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn load_feed() -> (HtmlTree, RuleSet) {
    let html = fs::read_to_string(fixture_path("feed.html"))
        .unwrap_or_else(|e| panic!("failed to read feed fixture: {}", e));
    let rules = from_path(fixture_path("feed_rules.json")).unwrap();
    (HtmlTree::parse_document(&html), rules)
}

fn node(tree: &HtmlTree, css: &str) -> ego_tree::NodeId {
    tree.query(css).unwrap()[0]
}

fn promoted_rule_set() -> RuleSet {
    let mut rs = RuleSet::new("promoted", 0.5);
    rs.container_rules = vec![ContainerRule::label_led(["Promoted"], 1.0)];
    rs.field_rules = vec![FieldRule::new(AdField::Advertiser, "a", 1.0)];
    rs.validators = vec![ValidationRule::RequiredField {
        field: AdField::Advertiser,
        weight: 1.0,
    }];
    rs
}

#[test]
fn feed_fixture_detects_only_the_sponsored_post() {
    let (tree, rules) = load_feed();
    let detector = Detector::new(rules, DetectorOptions::default()).unwrap();
    let found = detector.detect(&tree);

    assert_eq!(found.len(), 1);
    let ad = &found[0];
    assert_eq!(tree.attr(ad.node, "id").as_deref(), Some("t1"));
    assert_eq!(ad.container_match.rule_id, "sponsored-label");
    // article > div.header > span.label
    assert_eq!(ad.container_match.label_confidence, Some(0.9));
    assert!((ad.container_match.score - 0.9).abs() < 1e-9);

    assert_eq!(ad.fields.label.as_deref(), Some("Sponsored"));
    assert_eq!(ad.fields.advertiser.as_deref(), Some("Acme Corp"));
    assert_eq!(ad.fields.advertiser_handle.as_deref(), Some("/acme"));
    assert_eq!(
        ad.fields.destination_url.as_deref(),
        Some("https://acme.test/coffee?ref=1")
    );
    assert_eq!(ad.fields.images, vec!["https://img.test/coffee.png"]);

    assert!(ad.validation.valid);
    assert!((ad.validation.confidence - 1.0).abs() < 1e-9);
    assert_eq!(ad.validation.reasons.len(), 4);
    assert_eq!(ad.placement.index, 0);
    assert_eq!(ad.placement.path, "html > body > main > div > article");
}

#[test]
fn feed_fixture_quoted_label_is_excluded() {
    let (tree, rules) = load_feed();
    let detector = Detector::new(rules, DetectorOptions::default()).unwrap();
    let info = detector.debug_info(&tree, node(&tree, "#t2"));
    match &info.container_rules[0].status {
        RuleStatus::Excluded { reason, .. } => assert!(reason.contains(".quote")),
        other => panic!("expected exclusion, got {:?}", other),
    }
    assert_eq!(info.container_rules[1].status, RuleStatus::NoMatch);
    assert!(!info.would_accept);
}

#[test]
fn feed_fixture_quoted_label_scores_below_disclosure_without_exclusion() {
    let (tree, mut rules) = load_feed();
    rules.container_rules[0] = rules.container_rules[0]
        .clone()
        .with_filters(NegativeFilters::default());
    let found = find_containers(&rules, &tree, &DetectorOptions::default());
    assert_eq!(found.len(), 2);

    let t1 = &found[0];
    let t2 = &found[1];
    assert_eq!(t1.node, node(&tree, "#t1"));
    assert_eq!(t2.node, node(&tree, "#t2"));
    assert_eq!(t2.label_node, Some(node(&tree, ".quote span")));
    assert_eq!(t2.label_confidence, Some(0.7));
    assert!(t2.score < t1.score, "{} !< {}", t2.score, t1.score);

    let detector = Detector::new(rules, DetectorOptions::default()).unwrap();
    let accepted: Vec<_> = detector.detect(&tree).into_iter().map(|c| c.node).collect();
    assert_eq!(accepted, vec![node(&tree, "#t1")]);
}

#[test]
fn feed_fixture_rules_are_clean() {
    let (_, rules) = load_feed();
    let report = ConfigValidator::new().validate(&rules);
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn find_containers_is_idempotent() {
    let (tree, rules) = load_feed();
    let opts = DetectorOptions::default();
    let first = find_containers(&rules, &tree, &opts);
    let second = find_containers(&rules, &tree, &opts);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn field_fallback_uses_highest_scoring_rule_that_matches() {
    let tree = HtmlTree::parse_document(
        r#"<article id="ad">Promoted
             <h3 class="medium">From the 0.8 rule</h3>
             <p class="low">From the 0.6 rule</p></article>"#,
    );
    let mut rs = promoted_rule_set();
    rs.field_rules = vec![
        FieldRule::new(AdField::Headline, "p.low", 0.6),
        FieldRule::new(AdField::Headline, "h2.high", 1.0),
        FieldRule::new(AdField::Headline, "h3.medium", 0.8),
        FieldRule::new(AdField::Advertiser, "h3", 1.0),
    ];
    let detector = Detector::new(rs, DetectorOptions::default()).unwrap();
    let found = detector.detect(&tree);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].fields.headline.as_deref(), Some("From the 0.8 rule"));
    let tried: Vec<f64> = found[0]
        .field_extractions
        .iter()
        .filter(|e| e.field == AdField::Headline)
        .map(|e| e.score)
        .collect();
    assert_eq!(tried, vec![1.0, 0.8]);
}

#[test]
fn raising_min_confidence_never_adds_candidates() {
    let tree = HtmlTree::parse_document(
        r#"<main>
             <article>Promoted <a class="who">Acme</a> <a class="go" href="https://acme.test">Go</a></article>
             <article>Promoted <a class="who">Beta</a></article>
             <article>Promoted nothing else</article>
           </main>"#,
    );
    let mut previous = usize::MAX;
    for step in 0..=10 {
        let mut rs = promoted_rule_set();
        rs.min_confidence = step as f64 / 10.0;
        rs.adaptive_threshold = true;
        rs.field_rules = vec![
            FieldRule::new(AdField::Advertiser, "a.who", 1.0),
            FieldRule::new(AdField::DestinationUrl, "a.go", 1.0).with_attr("href"),
        ];
        rs.validators = vec![
            ValidationRule::RequiredField {
                field: AdField::Advertiser,
                weight: 0.5,
            },
            ValidationRule::UrlValid { weight: 0.5 },
        ];
        let count = Detector::new(rs, DetectorOptions::default())
            .unwrap()
            .detect(&tree)
            .len();
        assert!(count <= previous, "min {} accepted {} > {}", step, count, previous);
        previous = count;
    }
    assert_eq!(previous, 1);
}

#[test]
fn node_matching_own_exclude_selector_never_appears() {
    let tree = HtmlTree::parse_document(
        r#"<main>
             <article class="ad">one</article>
             <article class="ad organic">two</article>
             <article class="ad"><div class="organic">three</div></article>
           </main>"#,
    );
    let mut rs = RuleSet::new("ads", 0.5);
    rs.container_rules = vec![ContainerRule::css("article.ad", 0.9).with_filters(NegativeFilters {
        exclude_selectors: vec![".organic".to_string()],
        ..Default::default()
    })];
    let found = find_containers(&rs, &tree, &DetectorOptions::default());
    assert_eq!(found.len(), 1);
    assert_eq!(tree.text(found[0].node), "one");
}

#[test]
fn advertiser_next_to_label_beats_deeper_match() {
    let tree = HtmlTree::parse_document(
        r#"<article id="ad">
             <div><div><div><a class="user">Far Away</a></div></div></div>
             <span>Sponsored</span>
             <a class="user">Next Door</a>
           </article>"#,
    );
    let mut rs = RuleSet::new("proximity", 0.2);
    rs.container_rules = vec![ContainerRule::label_led(["Sponsored"], 1.0).within("article")];
    rs.field_rules = vec![FieldRule::new(AdField::Advertiser, "a.user", 1.0)];
    let detector = Detector::new(rs, DetectorOptions::default()).unwrap();
    let found = detector.detect(&tree);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].fields.advertiser.as_deref(), Some("Next Door"));
    assert!(found[0].field_extractions[0].used_context);
}

#[test]
fn missing_destination_extractor_warns_but_malformed_selector_fails() {
    let rs = promoted_rule_set();
    let report = ConfigValidator::new().validate(&rs);
    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("destinationUrl")));

    let mut broken = promoted_rule_set();
    broken.container_rules[0] = broken.container_rules[0]
        .clone()
        .with_filters(NegativeFilters {
            exclude_ancestors: vec!["nav[".to_string()],
            ..Default::default()
        });
    let report = ConfigValidator::new().validate(&broken);
    assert!(!report.valid);
    let err = Detector::new(broken, DetectorOptions::default()).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn promoted_container_with_advertiser_link_is_accepted() {
    let detector = Detector::new(promoted_rule_set(), DetectorOptions::default()).unwrap();

    for html in [
        r#"<article>Promoted <a href="/acme">Acme Corp</a></article>"#,
        r#"<div data-testid="post">Promoted <a href="/acme">Acme Corp</a></div>"#,
    ] {
        let tree = HtmlTree::parse_document(html);
        let found = detector.detect(&tree);
        assert_eq!(found.len(), 1, "{}", html);
        assert_eq!(found[0].fields.advertiser.as_deref(), Some("Acme Corp"));
        assert_eq!(found[0].validation.confidence, 1.0);
        assert!(found[0].validation.valid);
    }
}

#[test]
fn promoted_container_without_advertiser_is_rejected() {
    let detector = Detector::new(promoted_rule_set(), DetectorOptions::default()).unwrap();
    let tree = HtmlTree::parse_document(r#"<article>Promoted <span>Acme Corp</span></article>"#);
    assert_eq!(detector.find_containers(&tree).len(), 1);
    assert!(detector.detect(&tree).is_empty());
}

#[test]
fn registry_loads_rule_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixture_path("feed_rules.json"), dir.path().join("timeline.json")).unwrap();
    fs::write(
        dir.path().join("promoted.json"),
        serde_json::to_string(&promoted_rule_set()).unwrap(),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut registry = RuleSetRegistry::new();
    assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
    assert_eq!(registry.get("timeline.test").unwrap().id, "timeline-ads");
    assert_eq!(registry.get("promoted").unwrap().container_rules.len(), 1);
}
