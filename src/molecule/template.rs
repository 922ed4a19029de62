//! `{{var}}` template expansion for molecule descriptions.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap())
}

/// Substitute every `{{key}}` occurrence with its binding. Unbound
/// placeholders are left in place; callers that require full expansion check
/// [`unresolved_vars`] afterwards.
pub fn expand_vars(text: &str, vars: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures| {
            match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Placeholder names still present in `text`, in order of first appearance.
pub fn unresolved_vars(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in placeholder_re().captures_iter(text) {
        let name = caps[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expansion() {
        let text = "Polecat Arm ({{polecat_name}}) on {{rig}}";
        let expanded = expand_vars(text, &vars(&[("polecat_name", "toast"), ("rig", "gastown")]));

        assert!(expanded.contains("toast"));
        assert!(expanded.contains("gastown"));
        assert!(!expanded.contains("{{polecat_name}}"));
        assert!(!expanded.contains("{{rig}}"));
    }

    #[test]
    fn test_empty_binding_is_identity() {
        let text = "no placeholders here";
        assert_eq!(expand_vars(text, &HashMap::new()), text);

        let with_vars = "keep {{this}} intact";
        assert_eq!(expand_vars(with_vars, &HashMap::new()), with_vars);
    }

    #[test]
    fn test_identity_binding_is_identity() {
        let text = "value is {{x}} and {{y}}";
        let identity = vars(&[("x", "{{x}}"), ("y", "{{y}}")]);
        assert_eq!(expand_vars(text, &identity), text);
    }

    #[test]
    fn test_unresolved_vars() {
        let text = "{{a}} then {{b}} then {{a}} again";
        assert_eq!(unresolved_vars(text), vec!["a", "b"]);

        let expanded = expand_vars(text, &vars(&[("a", "1"), ("b", "2")]));
        assert!(unresolved_vars(&expanded).is_empty());
    }

    #[test]
    fn test_repeated_placeholder() {
        let text = "{{rig}}/{{rig}}";
        assert_eq!(expand_vars(text, &vars(&[("rig", "gastown")])), "gastown/gastown");
    }
}
