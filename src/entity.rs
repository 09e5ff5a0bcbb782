use std::borrow::Cow;

use crate::error::Error;

fn char_reference(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

/// Replace the predefined entities and character references in loaded
/// text.
pub(crate) fn decode_entities(content: Cow<str>) -> Result<Cow<str>, Error> {
    if !content.contains('&') {
        return Ok(content);
    }
    let mut result = String::with_capacity(content.len());
    let mut rest = content.as_ref();
    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let Some(semi) = tail.find(';') else {
            return Err(Error::UnclosedEntity(tail.to_string()));
        };
        let entity = &tail[..semi];
        match entity {
            "amp" => result.push('&'),
            "apos" => result.push('\''),
            "gt" => result.push('>'),
            "lt" => result.push('<'),
            "quot" => result.push('"'),
            _ => match char_reference(entity) {
                Some(c) => result.push(c),
                None => return Err(Error::InvalidEntity(entity.to_string())),
            },
        }
        rest = &tail[semi + 1..];
    }
    result.push_str(rest);
    Ok(result.into())
}

/// Where escaped text ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EscapeContext {
    Text,
    Attribute,
}

/// Escape text for output. `&` and `<` always; `>` always, so `]]>` can't
/// appear; `"` and whitespace other than space inside attribute values.
pub(crate) fn escape(content: &str, context: EscapeContext) -> Cow<str> {
    let needs = |c: char| match c {
        '&' | '<' | '>' => true,
        '"' | '\t' | '\n' | '\r' => context == EscapeContext::Attribute,
        _ => false,
    };
    if !content.chars().any(needs) {
        return content.into();
    }
    let mut result = String::with_capacity(content.len() + 8);
    for c in content.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' if context == EscapeContext::Attribute => result.push_str("&quot;"),
            '\t' if context == EscapeContext::Attribute => result.push_str("&#9;"),
            '\n' if context == EscapeContext::Attribute => result.push_str("&#10;"),
            '\r' if context == EscapeContext::Attribute => result.push_str("&#13;"),
            _ => result.push(c),
        }
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A &amp; B", "A & B")]
    #[case("&amp;&apos;&gt;&lt;&quot;", "&'><\"")]
    #[case("&#65;&#x42;c", "ABc")]
    #[case("no entities", "no entities")]
    fn test_decode(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(decode_entities(text.into()).unwrap(), expected);
    }

    #[test]
    fn test_decode_unknown_entity() {
        let err = decode_entities("&nbsp;".into());
        assert!(matches!(err, Err(Error::InvalidEntity(entity)) if entity == "nbsp"));
    }

    #[test]
    fn test_decode_bad_char_reference() {
        let err = decode_entities("&#xD800;".into());
        assert!(matches!(err, Err(Error::InvalidEntity(_))));
    }

    #[test]
    fn test_decode_unclosed_entity() {
        let err = decode_entities("a &amp".into());
        assert!(matches!(err, Err(Error::UnclosedEntity(entity)) if entity == "amp"));
    }

    #[test]
    fn test_decode_borrows_without_entities() {
        let text = "hello";
        let result = decode_entities(text.into()).unwrap();
        assert!(std::ptr::eq(text, result.as_ref()));
    }

    #[rstest]
    #[case("a < b & c > d", EscapeContext::Text, "a &lt; b &amp; c &gt; d")]
    #[case("say \"hi\"", EscapeContext::Text, "say \"hi\"")]
    #[case("say \"hi\"", EscapeContext::Attribute, "say &quot;hi&quot;")]
    #[case("a\nb", EscapeContext::Attribute, "a&#10;b")]
    fn test_escape(#[case] text: &str, #[case] context: EscapeContext, #[case] expected: &str) {
        assert_eq!(escape(text, context), expected);
    }
}
