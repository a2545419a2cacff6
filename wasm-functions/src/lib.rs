use wasm_bindgen::prelude::*;
use url_purifier::{PurifyOutcome, RuleDatabase, UserOverlay};

thread_local! {
    static RULES: RuleDatabase = RuleDatabase::builtin().unwrap_or_else(|_| RuleDatabase::empty());
}

fn outcome_json(outcome: &PurifyOutcome) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|_| String::from("{}"))
}

/// Purifies `input_url` against the builtin rules and the user overlay given as
/// JSON (`{customRules, exceptions, whitelist}`). Returns the outcome as JSON.
///
/// An overlay that does not parse leaves the URL untouched, since the whitelist
/// it carries cannot be honoured.
#[wasm_bindgen]
pub fn purify_url(input_url: &str, overlay_json: &str) -> String {
    let overlay: UserOverlay = if overlay_json.trim().is_empty() {
        UserOverlay::default()
    } else {
        match serde_json::from_str(overlay_json) {
            Ok(overlay) => overlay,
            Err(_) => return outcome_json(&PurifyOutcome::unchanged(input_url)),
        }
    };

    let outcome = RULES.with(|db| url_purifier::purify(input_url, db, &overlay));
    outcome_json(&outcome)
}

/// Unwraps a click-redirector URL. `undefined` means no valid destination.
#[wasm_bindgen]
pub fn resolve_redirect(candidate: &str) -> Option<String> {
    url_purifier::resolve_redirect(candidate)
}

/// Unwraps `input_url` only if it matches one of the builtin redirector shapes.
#[wasm_bindgen]
pub fn unwrap_known_redirect(input_url: &str) -> Option<String> {
    RULES.with(|db| url_purifier::unwrap_redirect(input_url, db.redirectors()).map(|(target, _)| target))
}
