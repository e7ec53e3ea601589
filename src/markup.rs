//! Inline entity markup: `{{mention|CLASS|target}}`.
//!
//! A line is split on balanced, non-nested double-brace blocks. Segments
//! between blocks are text, blocks are entities. Rendering the tokens back
//! with [`Token::raw`] reproduces the source line byte for byte.
//!
//! There is no escaping for `|`, `{{` or `}}` inside fields. Anything that
//! does not split cleanly is rejected with a [`MarkupError`] instead of being
//! guessed at.

use std::sync::OnceLock;

use serde::Serialize;
use thiserror::Error;

use regex::Regex;

/// Errors raised while tokenizing one line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// Entity block does not contain exactly three `|`-separated fields.
    #[error("malformed entity {markup:?}: expected 3 fields, found {fields}")]
    MalformedEntity { markup: String, fields: usize },

    /// Braces left over after splitting: unclosed, stray or nested blocks.
    #[error("unbalanced or nested entity markup in {segment:?}")]
    Unbalanced { segment: String },
}

/// An entity mention as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    /// The full `{{...}}` block as it appeared in the line.
    pub raw: String,
    pub mention: String,
    pub class: String,
    /// Knowledge-base title; empty for a mention without a link.
    pub target: String,
}

impl Entity {
    pub fn new(
        mention: impl Into<String>,
        class: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let mention = mention.into();
        let class = class.into();
        let target = target.into();
        Self {
            raw: render_entity(&mention, &class, &target),
            mention,
            class,
            target,
        }
    }

    pub fn is_linked(&self) -> bool {
        !self.target.is_empty()
    }

    /// Same mention and class, pointing at a different target.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self::new(self.mention.clone(), self.class.clone(), target)
    }
}

/// One segment of a tokenized line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Entity(Entity),
}

impl Token {
    /// Source form: literal text, or the entity's raw markup.
    pub fn raw(&self) -> &str {
        match self {
            Token::Text(text) => text,
            Token::Entity(entity) => &entity.raw,
        }
    }

    /// Plain-text form: literal text, or the entity's mention.
    pub fn plain(&self) -> &str {
        match self {
            Token::Text(text) => text,
            Token::Entity(entity) => &entity.mention,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Token::Entity(entity) => Some(entity),
            Token::Text(_) => None,
        }
    }
}

/// Tokens of one line plus its plain-text reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub tokens: Vec<Token>,
    pub plain_text: String,
}

impl ParsedLine {
    /// Entity tokens in line order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.tokens.iter().filter_map(Token::as_entity)
    }

    /// Concatenate the raw form of every token.
    pub fn render(&self) -> String {
        render_tokens(&self.tokens)
    }
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]*\}\}").expect("entity pattern compiles"))
}

/// Characters that cannot appear inside an entity field.
pub const RESERVED_CHARS: [char; 3] = ['{', '}', '|'];

/// Whether `value` can be written as a mention, class or target.
pub fn is_valid_field(value: &str) -> bool {
    !value.contains(RESERVED_CHARS)
}

/// Format an entity block.
pub fn render_entity(mention: &str, class: &str, target: &str) -> String {
    format!("{{{{{mention}|{class}|{target}}}}}")
}

/// Concatenate the raw form of every token.
pub fn render_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(Token::raw).collect()
}

/// Tokenize one line of markup.
///
/// Tokens alternate text and entity, starting and ending with a (possibly
/// empty) text token, so a line with `n` entities yields `2n + 1` tokens.
pub fn parse_line(raw: &str) -> Result<ParsedLine, MarkupError> {
    let mut tokens = Vec::new();
    let mut plain_text = String::with_capacity(raw.len());
    let mut last = 0;

    for block in entity_re().find_iter(raw) {
        push_text(&raw[last..block.start()], &mut tokens, &mut plain_text)?;
        let entity = parse_entity(block.as_str())?;
        plain_text.push_str(&entity.mention);
        tokens.push(Token::Entity(entity));
        last = block.end();
    }
    push_text(&raw[last..], &mut tokens, &mut plain_text)?;

    Ok(ParsedLine { tokens, plain_text })
}

fn push_text(
    segment: &str,
    tokens: &mut Vec<Token>,
    plain_text: &mut String,
) -> Result<(), MarkupError> {
    if segment.contains("{{") || segment.contains("}}") {
        return Err(MarkupError::Unbalanced {
            segment: segment.to_string(),
        });
    }
    plain_text.push_str(segment);
    tokens.push(Token::Text(segment.to_string()));
    Ok(())
}

fn parse_entity(markup: &str) -> Result<Entity, MarkupError> {
    // The pattern guarantees the block starts with `{{` and ends with `}}`.
    let inner = &markup[2..markup.len() - 2];
    let fields: Vec<&str> = inner.split('|').collect();
    match fields.as_slice() {
        [mention, class, target] => Ok(Entity {
            raw: markup.to_string(),
            mention: mention.to_string(),
            class: class.to_string(),
            target: target.to_string(),
        }),
        _ => Err(MarkupError::MalformedEntity {
            markup: markup.to_string(),
            fields: fields.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_round_trip() {
        let lines = [
            "Hello {{Paris|LOC|Paris}} world.",
            "{{Ada Lovelace|PER|Ada_Lovelace}} met {{Babbage|PER|}} in {{London|LOC|London}}",
            "no entities here",
            "",
            "trailing\r",
            "{{A|B|C}}{{D|E|F}}",
            "Zürich {{Zürich|LOC|Zürich}} – ünïcode",
        ];
        for line in lines {
            let parsed = parse_line(line).unwrap();
            assert_eq!(parsed.render(), line);
        }
    }

    #[test]
    fn test_parse_line_tokens_alternate() {
        let parsed = parse_line("Hello {{Paris|LOC|Paris}} world.").unwrap();
        assert_eq!(
            parsed.tokens,
            vec![
                Token::Text("Hello ".to_string()),
                Token::Entity(Entity::new("Paris", "LOC", "Paris")),
                Token::Text(" world.".to_string()),
            ]
        );
        assert_eq!(parsed.plain_text, "Hello Paris world.");
    }

    #[test]
    fn test_entity_count_matches_blocks() {
        let line = "{{a|X|}} b {{c|Y|C}} d {{e|Z|E}}";
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.entities().count(), 3);
        assert_eq!(parsed.tokens.len(), 7);
        assert!(!parsed.plain_text.contains("{{"));
        assert!(!parsed.plain_text.contains("}}"));
        assert_eq!(parsed.plain_text, "a b c d e");
    }

    #[test]
    fn test_unlinked_entity_has_empty_target() {
        let parsed = parse_line("{{Somebody|PER|}} said").unwrap();
        let entity = parsed.entities().next().unwrap();
        assert_eq!(entity.target, "");
        assert!(!entity.is_linked());
        assert_eq!(entity.raw, "{{Somebody|PER|}}");
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        assert_eq!(
            parse_line("x {{Paris|LOC}} y"),
            Err(MarkupError::MalformedEntity {
                markup: "{{Paris|LOC}}".to_string(),
                fields: 2,
            })
        );
        assert_eq!(
            parse_line("{{A|B|C|D}}"),
            Err(MarkupError::MalformedEntity {
                markup: "{{A|B|C|D}}".to_string(),
                fields: 4,
            })
        );
    }

    #[test]
    fn test_nested_and_unclosed_markup_is_rejected() {
        assert!(matches!(
            parse_line("{{outer {{inner|X|Y}} rest|A|B}}"),
            Err(MarkupError::Unbalanced { .. })
        ));
        assert!(matches!(
            parse_line("open {{Paris|LOC|Paris"),
            Err(MarkupError::Unbalanced { .. })
        ));
        // Single braces are ordinary text.
        assert!(parse_line("set {x} and {{a|B|c}}}").is_ok());
    }

    #[test]
    fn test_field_validity() {
        assert!(is_valid_field("Atlantis (mythology)"));
        assert!(is_valid_field(""));
        assert!(!is_valid_field("Atlantis|myth"));
        assert!(!is_valid_field("a{b"));
        assert!(!is_valid_field("b}"));
        let rendered = render_entity("X", "LOC", "Atlantis (mythology)");
        assert_eq!(parse_line(&rendered).unwrap().render(), rendered);
    }

    #[test]
    fn test_with_target_rerenders_markup() {
        let entity = Entity::new("NYC", "LOC", "Nyc");
        let fixed = entity.with_target("New York City");
        assert_eq!(fixed.raw, "{{NYC|LOC|New York City}}");
        assert_eq!(fixed.mention, "NYC");
        assert_eq!(entity.with_target("").raw, "{{NYC|LOC|}}");
    }
}
