//! Entity context builder.
//!
//! Filters a home-automation state snapshot down to the entities allowed to
//! appear in the model's system prompt, and renders them as prompt lines.

use serde_json::Value;

/// A filtered, read-only view of one home-automation entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub entity_id: String,
    pub friendly_name: String,
    pub state_string: String,
    pub domain: String,
}

/// Placeholder line embedded when the state fetch itself failed.
pub const PLACEHOLDER_FETCH_FAILED: &str = "(Could not fetch Home Assistant entity list.)";

/// Placeholder line embedded when the fetch succeeded but nothing matched.
pub const PLACEHOLDER_NO_MATCHES: &str = "(No entities matched the current filters.)";

/// Filters raw home-automation state objects into [`EntityView`]s.
///
/// Applies, in iteration order of `states`, stopping early once
/// `max_entities` results have been collected:
///
/// 1. Drop entries with an empty `entity_id`.
/// 2. Extract `domain` as the prefix before the first `.`.
/// 3. If `allowed_domains` is non-empty, require `domain` to be a member.
/// 4. If `allowlist` is non-empty, require some glob to match `entity_id`.
/// 5. Drop if any `blocklist` glob matches `entity_id`.
#[must_use]
pub fn filter_entities(
    states: &[Value],
    allowed_domains: &[String],
    allowlist: &[String],
    blocklist: &[String],
    max_entities: usize,
) -> Vec<EntityView> {
    let mut out = Vec::new();

    for state in states {
        let entity_id = state
            .get("entity_id")
            .and_then(Value::as_str)
            .unwrap_or("");
        if entity_id.is_empty() {
            continue;
        }

        let domain = entity_domain(entity_id);

        if !allowed_domains.is_empty() && !allowed_domains.iter().any(|d| d == domain) {
            continue;
        }
        if !allowlist.is_empty() && !allowlist.iter().any(|pattern| glob_match(pattern, entity_id))
        {
            continue;
        }
        if blocklist.iter().any(|pattern| glob_match(pattern, entity_id)) {
            continue;
        }

        let friendly_name = state
            .get("attributes")
            .and_then(|a| a.get("friendly_name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(entity_id)
            .to_string();
        let state_string = state
            .get("state")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string();

        out.push(EntityView {
            entity_id: entity_id.to_string(),
            friendly_name,
            state_string,
            domain: domain.to_string(),
        });

        if out.len() >= max_entities {
            break;
        }
    }

    out
}

fn entity_domain(entity_id: &str) -> &str {
    entity_id.split('.').next().unwrap_or("")
}

/// Shell-style glob match supporting `*` (any run of characters) and `?`
/// (exactly one character). No character classes or brace expansion —
/// entity allow/block lists in practice only ever use `*`/`?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_inner(&pattern, &text)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}

/// Renders entity views as `- <name> (<entity_id>) = <state>` lines, one per
/// entity, for embedding in the system prompt's device block. Renders a
/// single placeholder line if `entities` is empty.
#[must_use]
pub fn render_context_lines(entities: &[EntityView]) -> Vec<String> {
    if entities.is_empty() {
        return vec![PLACEHOLDER_NO_MATCHES.to_string()];
    }
    entities
        .iter()
        .map(|e| format!("- {} ({}) = {}", e.friendly_name, e.entity_id, e.state_string))
        .collect()
}

/// Fetches the current state snapshot via `fetch` and builds rendered
/// context lines, substituting [`PLACEHOLDER_FETCH_FAILED`] if the fetch
/// itself errors rather than propagating the failure — the session still
/// opens with that single placeholder line.
pub async fn build_context_lines<F, Fut, E>(
    fetch: F,
    allowed_domains: &[String],
    allowlist: &[String],
    blocklist: &[String],
    max_entities: usize,
) -> Vec<String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Value>, E>>,
    E: std::fmt::Display,
{
    match fetch().await {
        Ok(states) => {
            let entities = filter_entities(&states, allowed_domains, allowlist, blocklist, max_entities);
            render_context_lines(&entities)
        }
        Err(e) => {
            log::warn!("failed to fetch home assistant entity states: {e}");
            vec![PLACEHOLDER_FETCH_FAILED.to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(entity_id: &str, friendly_name: Option<&str>, value: &str) -> Value {
        let mut attrs = serde_json::Map::new();
        if let Some(name) = friendly_name {
            attrs.insert("friendly_name".to_string(), json!(name));
        }
        json!({ "entity_id": entity_id, "state": value, "attributes": attrs })
    }

    #[test]
    fn drops_empty_entity_id() {
        let states = vec![json!({ "entity_id": "", "state": "on" })];
        let out = filter_entities(&states, &[], &[], &[], 200);
        assert!(out.is_empty());
    }

    #[test]
    fn domain_filter_keeps_only_allowed() {
        let states = vec![
            state("light.kitchen", Some("Kitchen"), "off"),
            state("sensor.outdoor_temp", None, "18"),
        ];
        let out = filter_entities(&states, &["light".to_string()], &[], &[], 200);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_id, "light.kitchen");
    }

    #[test]
    fn allowlist_glob_filters() {
        let states = vec![
            state("light.kitchen", Some("Kitchen"), "off"),
            state("light.bedroom", Some("Bedroom"), "on"),
        ];
        let out = filter_entities(&states, &[], &["light.kitchen*".to_string()], &[], 200);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_id, "light.kitchen");
    }

    #[test]
    fn blocklist_glob_drops_match() {
        let states = vec![
            state("light.kitchen", Some("Kitchen"), "off"),
            state("light.bedroom", Some("Bedroom"), "on"),
        ];
        let out = filter_entities(&states, &[], &[], &["light.bed*".to_string()], 200);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_id, "light.kitchen");
    }

    #[test]
    fn max_entities_caps_results() {
        let states: Vec<Value> = (0..5)
            .map(|i| state(&format!("light.l{i}"), None, "off"))
            .collect();
        let out = filter_entities(&states, &[], &[], &[], 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn missing_friendly_name_falls_back_to_entity_id() {
        let states = vec![state("light.kitchen", None, "off")];
        let out = filter_entities(&states, &[], &[], &[], 200);
        assert_eq!(out[0].friendly_name, "light.kitchen");
    }

    #[test]
    fn missing_state_falls_back_to_unknown() {
        let s = json!({ "entity_id": "light.kitchen", "attributes": {} });
        let out = filter_entities(&[s], &[], &[], &[], 200);
        assert_eq!(out[0].state_string, "unknown");
    }

    #[test]
    fn render_lines_match_expected_format() {
        let views = vec![EntityView {
            entity_id: "light.kitchen".to_string(),
            friendly_name: "Kitchen".to_string(),
            state_string: "off".to_string(),
            domain: "light".to_string(),
        }];
        let lines = render_context_lines(&views);
        assert_eq!(lines, vec!["- Kitchen (light.kitchen) = off".to_string()]);
    }

    #[test]
    fn render_lines_placeholder_when_empty() {
        let lines = render_context_lines(&[]);
        assert_eq!(lines, vec![PLACEHOLDER_NO_MATCHES.to_string()]);
    }

    #[test]
    fn glob_match_star_and_question_mark() {
        assert!(glob_match("light.*", "light.kitchen"));
        assert!(glob_match("light.k?tchen", "light.kitchen"));
        assert!(!glob_match("light.k?tchen", "light.kiitchen"));
        assert!(!glob_match("switch.*", "light.kitchen"));
    }

    #[tokio::test]
    async fn build_context_lines_uses_placeholder_on_fetch_error() {
        let lines = build_context_lines(
            || async { Err::<Vec<Value>, _>("network down") },
            &[],
            &[],
            &[],
            200,
        )
        .await;
        assert_eq!(lines, vec![PLACEHOLDER_FETCH_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn build_context_lines_uses_placeholder_when_nothing_matches() {
        let lines = build_context_lines(
            || async { Ok(vec![state("sensor.outdoor_temp", None, "18")]) },
            &["light".to_string()],
            &[],
            &[],
            200,
        )
        .await;
        assert_eq!(lines, vec![PLACEHOLDER_NO_MATCHES.to_string()]);
    }
}
