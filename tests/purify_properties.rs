use std::sync::Arc;

use pretty_assertions::assert_eq;
use url_purifier::settings::{MemorySettings, SettingsRepository};
use url_purifier::{
    purify, resolve_redirect, Engine, PurifyOutcome, RuleDatabase, RuleId, UserOverlay,
};

fn builtin() -> RuleDatabase {
    RuleDatabase::builtin().expect("builtin rule table loads")
}

const SAMPLES: &[&str] = &[
    "https://example.org/?fbclid=abc",
    "https://x.com/a?utm_source=y&id=5",
    "https://www.ebay.com/p?itemId=1&mkcid=2&mkevt=3",
    "https://www.amazon.de/dp/B000?tag=aff-21&psc=1&keep=yes#reviews",
    "https://www.youtube.com/watch?v=dQw4w9WgXcQ&si=abc&feature=share",
    "https://news.example/a?utm%5Fmedium=x&&page=2&gclid=z",
    "https://ad.doubleclick.net/c?dc_trk_aid=1&dc_other=1",
    "https://example.org/no-query",
    "https://example.org/?",
    "not even a url",
];

#[test]
fn test_urls_without_query_are_untouched() {
    let db = builtin();
    let overlay = UserOverlay::default();
    for url in ["https://example.org", "https://example.org/path/to#frag", "http://[::1]:8080/x"] {
        let out = purify(url, &db, &overlay);
        assert_eq!(out, PurifyOutcome::unchanged(url));
    }
}

#[test]
fn test_whitelisted_hosts_are_untouched() {
    let db = builtin();
    let mut overlay = UserOverlay::default();
    overlay.whitelist_host("ebay.com");
    let url = "https://www.ebay.com/p?itemId=1&mkcid=2&fbclid=3";
    let out = purify(url, &db, &overlay);
    assert_eq!(out, PurifyOutcome::unchanged(url));
}

#[test]
fn test_idempotence() {
    let db = builtin();
    let mut overlay = UserOverlay::default();
    overlay.add_custom_rule("example.org", ["page"]).unwrap();
    for url in SAMPLES {
        let once = purify(url, &db, &overlay);
        let twice = purify(&once.cleaned_url, &db, &overlay);
        assert_eq!(twice.cleaned_url, once.cleaned_url, "{url}");
        assert!(!twice.changed, "{url}");
    }
}

#[test]
fn test_generic_rule_on_any_host() {
    let out = purify("https://example.org/?fbclid=abc", &builtin(), &UserOverlay::default());
    assert_eq!(out.cleaned_url, "https://example.org/");
}

#[test]
fn test_domain_rule_union() {
    let out = purify(
        "https://www.ebay.com/p?itemId=1&mkcid=2&mkevt=3",
        &builtin(),
        &UserOverlay::default(),
    );
    assert_eq!(out.cleaned_url, "https://www.ebay.com/p?itemId=1");
}

#[test]
fn test_exception_disables_domain_rules() {
    let db = RuleDatabase::from_json(
        r#"{"rules": [
            {"domain": "*", "removeParams": ["fbclid"]},
            {"domain": "ebay.com", "removeParams": ["mkcid", "mkevt"]}
        ]}"#,
    )
    .unwrap();
    let mut overlay = UserOverlay::default();
    overlay.add_exception("ebay.com", RuleId::from("ebay.com"));

    let out = purify(
        "https://www.ebay.com/p?itemId=1&mkcid=2&mkevt=3&fbclid=4",
        &db,
        &overlay,
    );
    assert_eq!(out.cleaned_url, "https://www.ebay.com/p?itemId=1&mkcid=2&mkevt=3");
    assert_eq!(out.fired_rules, vec![RuleId::generic()]);
}

#[test]
fn test_pattern_rule_across_country_domains() {
    let db = builtin();
    let overlay = UserOverlay::default();
    for host in ["www.amazon.com", "www.amazon.co.jp", "smile.amazon.de"] {
        let url = format!("https://{host}/dp/B000?tag=aff-21&th=1");
        assert_eq!(purify(&url, &db, &overlay).cleaned_url, format!("https://{host}/dp/B000"));
    }
}

#[test]
fn test_pattern_rule_ignores_scheme_and_host_case() {
    let db = builtin();
    let overlay = UserOverlay::default();
    let out = purify("HTTPS://WWW.AMAZON.DE/dp/B0?tag=x&k=1", &db, &overlay);
    assert_eq!(out.cleaned_url, "HTTPS://WWW.AMAZON.DE/dp/B0?k=1");
    assert!(out.changed);
    assert_eq!(
        purify("https://www.amazon.de/dp/B0?tag=x&k=1", &db, &overlay).cleaned_url,
        "https://www.amazon.de/dp/B0?k=1"
    );
}

#[test]
fn test_reconstruction_order() {
    let out = purify("https://x.com/a?utm_source=y&id=5", &builtin(), &UserOverlay::default());
    assert_eq!(out.cleaned_url, "https://x.com/a?id=5");
}

#[test]
fn test_custom_rule_merge_through_settings() {
    let settings = MemorySettings::default();
    settings
        .update(|s| Ok(s.overlay.add_custom_rule("foo.com", ["x"])?))
        .unwrap();
    settings
        .update(|s| Ok(s.overlay.add_custom_rule("foo.com", ["x", "y"])?))
        .unwrap();

    let current = settings.get();
    assert_eq!(current.overlay.custom_rules.len(), 1);
    assert_eq!(current.overlay.custom_rules[0].params, vec!["x", "y"]);
}

#[test]
fn test_stats_one_per_call_one_per_rule() {
    let engine = Engine::new(Arc::new(builtin()), Arc::new(MemorySettings::default()));
    engine.process("https://www.ebay.com/p?itemId=1&mkcid=2&mkevt=3&mkrid=4");
    let stats = engine.stats();
    assert_eq!(stats.total_modified, 1);
    assert_eq!(stats.count_for("ebay.com"), 1);
    assert!(stats.rule_effectiveness.iter().all(|r| r.count == 1));
}

#[test]
fn test_redirect_resolver_examples() {
    assert_eq!(
        resolve_redirect("https://www.google.com/url?q=https%3A%2F%2Fexample.com%2Fpage&sa=D").as_deref(),
        Some("https://example.com/page")
    );
    assert_eq!(
        resolve_redirect("aHR0cHM6Ly9leGFtcGxlLmNvbQ==").as_deref(),
        Some("https://example.com")
    );
    assert_eq!(resolve_redirect("%%% garbage %%%"), None);
}

#[test]
fn test_engine_unwraps_builtin_redirectors() {
    let engine = Engine::new(Arc::new(builtin()), Arc::new(MemorySettings::default()));
    let out = engine.process(
        "https://www.google.com/url?sa=t&url=https%3A%2F%2Fshop.example%2F%3Futm_source%3Dnews%26id%3D3&usg=AOv",
    );
    assert_eq!(out.cleaned_url, "https://shop.example/?id=3");
    assert_eq!(out.fired_rules[0], RuleId::redirect("google"));
}

#[test]
fn test_concurrent_processing_shares_counters() {
    let engine = Engine::new(Arc::new(builtin()), Arc::new(MemorySettings::default()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for j in 0..50 {
                    let url = format!("https://site{i}.example/?fbclid={j}&keep=1");
                    assert_eq!(engine.process(&url).cleaned_url, format!("https://site{i}.example/?keep=1"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.stats().total_modified, 200);
    assert_eq!(engine.stats().count_for("*"), 200);
}
