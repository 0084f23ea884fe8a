//! Outreach template rendering.
//!
//! Substitution is literal text replacement of `{{field}}` and `{field}`
//! tokens from a context map. Unresolved placeholders are left in place so
//! a half-filled template is visible in the output rather than silently
//! blanked.

use std::collections::HashMap;

/// Render a template body or subject against founder/startup context vars.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            result.push(c);
            continue;
        }

        let double = chars.peek() == Some(&'{');
        if double {
            chars.next();
        }

        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&next) = chars.peek() {
            if next == '}' {
                chars.next();
                if double {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        closed = true;
                    } else {
                        // `{{name}`: treat the lone brace as literal text
                        var_name.push('}');
                        continue;
                    }
                } else {
                    closed = true;
                }
                break;
            }
            if next == '{' {
                break;
            }
            var_name.push(next);
            chars.next();
        }

        let var_name_trimmed = var_name.trim();
        if closed {
            if let Some(value) = vars.get(var_name_trimmed) {
                result.push_str(value);
                continue;
            }
        }

        // Unknown or malformed, emit the original text unchanged
        if double {
            result.push_str("{{");
        } else {
            result.push('{');
        }
        result.push_str(&var_name);
        if closed {
            if double {
                result.push_str("}}");
            } else {
                result.push('}');
            }
        }
    }

    result
}

/// Build the substitution context for a founder/startup pair.
pub fn outreach_vars(
    founder: &crate::types::Founder,
    startup: Option<&crate::types::Startup>,
) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("first_name", founder.first_name.clone());
    vars.insert("last_name", founder.last_name.clone());
    vars.insert("full_name", founder.full_name());
    if let Some(role) = &founder.role {
        vars.insert("role", role.clone());
    }
    if let Some(s) = startup {
        vars.insert("company", s.name.clone());
        if let Some(site) = &s.website {
            vars.insert("website", site.clone());
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("first_name", "Grace".to_string()),
            ("company", "Acme Robotics".to_string()),
        ])
    }

    #[test]
    fn substitutes_double_brace_tokens() {
        let out = render("Hi {{first_name}}, congrats on {{company}}!", &vars());
        assert_eq!(out, "Hi Grace, congrats on Acme Robotics!");
    }

    #[test]
    fn substitutes_single_brace_tokens() {
        let out = render("Hi {first_name}, congrats on {company}!", &vars());
        assert_eq!(out, "Hi Grace, congrats on Acme Robotics!");
    }

    #[test]
    fn mixed_syntax_in_one_template() {
        let out = render("{{first_name}} at {company}", &vars());
        assert_eq!(out, "Grace at Acme Robotics");
    }

    #[test]
    fn unresolved_placeholders_left_as_is() {
        let out = render("Hi {{first_name}}, saw {{funding_round}} news", &vars());
        assert_eq!(out, "Hi Grace, saw {{funding_round}} news");

        let out = render("Hi {nickname}", &vars());
        assert_eq!(out, "Hi {nickname}");
    }

    #[test]
    fn unclosed_braces_emitted_verbatim() {
        let out = render("Hi {{first_name", &vars());
        assert_eq!(out, "Hi {{first_name");

        let out = render("a { b } c", &vars());
        assert_eq!(out, "a { b } c");
    }

    #[test]
    fn tolerates_whitespace_inside_tokens() {
        let out = render("Hi {{ first_name }}", &vars());
        assert_eq!(out, "Hi Grace");
    }

    #[test]
    fn outreach_vars_include_startup_fields() {
        let user = uuid::Uuid::new_v4();
        let mut startup = crate::types::Startup::new(user, "12345678", "Acme Robotics");
        startup.website = Some("https://acme.example".to_string());
        let mut founder = crate::types::Founder::new(startup.id, user, "Grace", "Hopper");
        founder.role = Some("CEO".to_string());

        let ctx = outreach_vars(&founder, Some(&startup));
        let out = render("{{full_name}} ({{role}}) — {{company}}", &ctx);
        assert_eq!(out, "Grace Hopper (CEO) — Acme Robotics");
    }
}
