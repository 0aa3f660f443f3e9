use std::fmt;

use serde::{Deserialize, Serialize};

/// One normalized DSL instruction. Verb matching is case-insensitive;
/// arguments are trimmed. Anything else fails to parse.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", content = "arg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    ClickText(String),
    ClickId(String),
    ClickCss(String),
    TypeId { field: String, value: String },
    WaitText(String),
    AssertText(String),
    WaitUrlContains(String),
    WaitMs(u64),
    Screenshot(String),
}

/// Why a single instruction string failed to parse.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseFailure {
    /// The text does not start with a recognized verb.
    UnknownVerb,
    /// The verb is recognized but its argument is malformed.
    BadArgument(String),
}

impl Instruction {
    /// Parse one instruction line, e.g. `CLICK_TEXT: Form Authentication`.
    pub fn parse(raw: &str) -> Result<Self, ParseFailure> {
        let line = raw.trim();
        let (verb, arg) = match line.split_once(':') {
            Some((v, a)) => (v.trim(), a.trim()),
            None => return Err(ParseFailure::UnknownVerb),
        };

        match verb.to_ascii_uppercase().as_str() {
            "CLICK_TEXT" => require_arg(arg).map(Instruction::ClickText),
            "CLICK_ID" => require_arg(arg).map(Instruction::ClickId),
            "CLICK_CSS" => require_arg(arg).map(Instruction::ClickCss),
            "TYPE_ID" => parse_type_id(arg),
            "WAIT_TEXT" => require_arg(arg).map(Instruction::WaitText),
            "ASSERT_TEXT" => require_arg(arg).map(Instruction::AssertText),
            "WAIT_URL_CONTAINS" => require_arg(arg).map(Instruction::WaitUrlContains),
            "WAIT_MS" => arg
                .parse::<u64>()
                .map(Instruction::WaitMs)
                .map_err(|_| ParseFailure::BadArgument("WAIT_MS expects an integer".into())),
            "SCREENSHOT" => {
                // An empty label falls back to a generic one, matching the
                // forgiving behavior screenshots have always had.
                let label = if arg.is_empty() { "shot" } else { arg };
                Ok(Instruction::Screenshot(label.to_string()))
            }
            _ => Err(ParseFailure::UnknownVerb),
        }
    }

    /// The canonical verb name, for audit payloads.
    pub fn verb(&self) -> &'static str {
        match self {
            Instruction::ClickText(_) => "CLICK_TEXT",
            Instruction::ClickId(_) => "CLICK_ID",
            Instruction::ClickCss(_) => "CLICK_CSS",
            Instruction::TypeId { .. } => "TYPE_ID",
            Instruction::WaitText(_) => "WAIT_TEXT",
            Instruction::AssertText(_) => "ASSERT_TEXT",
            Instruction::WaitUrlContains(_) => "WAIT_URL_CONTAINS",
            Instruction::WaitMs(_) => "WAIT_MS",
            Instruction::Screenshot(_) => "SCREENSHOT",
        }
    }

    /// The normalized argument, for audit payloads. Typed values are redacted
    /// down to the field name so credentials never reach the log.
    pub fn argument(&self) -> String {
        match self {
            Instruction::ClickText(s)
            | Instruction::ClickId(s)
            | Instruction::ClickCss(s)
            | Instruction::WaitText(s)
            | Instruction::AssertText(s)
            | Instruction::WaitUrlContains(s)
            | Instruction::Screenshot(s) => s.clone(),
            Instruction::TypeId { field, .. } => format!("{field}=***"),
            Instruction::WaitMs(ms) => ms.to_string(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.verb(), self.argument())
    }
}

fn require_arg(arg: &str) -> Result<String, ParseFailure> {
    if arg.is_empty() {
        Err(ParseFailure::BadArgument("argument must not be empty".into()))
    } else {
        Ok(arg.to_string())
    }
}

fn parse_type_id(arg: &str) -> Result<Instruction, ParseFailure> {
    let (field, value) = arg
        .split_once('=')
        .ok_or_else(|| ParseFailure::BadArgument("TYPE_ID expects field=value".into()))?;
    let field = field.trim();
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ParseFailure::BadArgument(format!(
            "TYPE_ID field id '{field}' is not a valid element id"
        )));
    }
    Ok(Instruction::TypeId {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        let cases = [
            ("CLICK_TEXT: Form Authentication", "CLICK_TEXT"),
            ("CLICK_ID: submit", "CLICK_ID"),
            ("CLICK_CSS: button[type=\"submit\"]", "CLICK_CSS"),
            ("TYPE_ID: username=tomsmith", "TYPE_ID"),
            ("WAIT_TEXT: Welcome", "WAIT_TEXT"),
            ("ASSERT_TEXT: You logged in", "ASSERT_TEXT"),
            ("WAIT_URL_CONTAINS: /secure", "WAIT_URL_CONTAINS"),
            ("WAIT_MS: 500", "WAIT_MS"),
            ("SCREENSHOT: login", "SCREENSHOT"),
        ];
        for (raw, verb) in cases {
            let parsed = Instruction::parse(raw).unwrap();
            assert_eq!(parsed.verb(), verb, "for {raw}");
        }
    }

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(
            Instruction::parse("click_text: Login").unwrap(),
            Instruction::ClickText("Login".into())
        );
        assert_eq!(
            Instruction::parse("Wait_Ms: 100").unwrap(),
            Instruction::WaitMs(100)
        );
    }

    #[test]
    fn arguments_are_trimmed() {
        assert_eq!(
            Instruction::parse("  WAIT_TEXT:   hello world  ").unwrap(),
            Instruction::WaitText("hello world".into())
        );
    }

    #[test]
    fn type_id_splits_on_first_equals() {
        let parsed = Instruction::parse("TYPE_ID: password=a=b=c").unwrap();
        assert_eq!(
            parsed,
            Instruction::TypeId {
                field: "password".into(),
                value: "a=b=c".into()
            }
        );
    }

    #[test]
    fn type_id_rejects_bad_field_ids() {
        assert!(matches!(
            Instruction::parse("TYPE_ID: user name=x"),
            Err(ParseFailure::BadArgument(_))
        ));
        assert!(matches!(
            Instruction::parse("TYPE_ID: =x"),
            Err(ParseFailure::BadArgument(_))
        ));
    }

    #[test]
    fn type_id_argument_is_redacted() {
        let parsed = Instruction::parse("TYPE_ID: password=SuperSecretPassword!").unwrap();
        assert_eq!(parsed.argument(), "password=***");
        assert!(!parsed.to_string().contains("SuperSecretPassword"));
    }

    #[test]
    fn wait_ms_requires_integer() {
        assert!(matches!(
            Instruction::parse("WAIT_MS: soon"),
            Err(ParseFailure::BadArgument(_))
        ));
    }

    #[test]
    fn screenshot_label_defaults() {
        assert_eq!(
            Instruction::parse("SCREENSHOT:").unwrap(),
            Instruction::Screenshot("shot".into())
        );
    }

    #[test]
    fn unknown_text_is_rejected_not_treated_as_click() {
        assert_eq!(
            Instruction::parse("open the login page"),
            Err(ParseFailure::UnknownVerb)
        );
        assert_eq!(
            Instruction::parse("NAVIGATE: https://example.com"),
            Err(ParseFailure::UnknownVerb)
        );
    }
}
