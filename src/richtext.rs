use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// One token of comment text. Produced by a single left-to-right pass over
/// the raw input so substitutions can never overlap or re-match each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Plain(String),
    Hashtag(String),
    Mention(String),
    Link(String),
    Emoji(&'static str),
}

const EMOTICONS: &[(&str, &str)] = &[(":)", "😊"), (":(", "😢"), (":D", "😃"), (";)", "😉")];

pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut plain = String::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if let Some((glyph, len)) = match_emoticon(&text[i..]) {
            flush_plain(&mut tokens, &mut plain);
            tokens.push(Token::Emoji(glyph));
            i += len;
            continue;
        }
        let rest = &text[i..];
        if rest.starts_with('#') {
            if let Some(word) = take_word(&rest[1..]) {
                flush_plain(&mut tokens, &mut plain);
                tokens.push(Token::Hashtag(word.to_string()));
                i += 1 + word.len();
                continue;
            }
        }
        if rest.starts_with('@') {
            if let Some(word) = take_word(&rest[1..]) {
                flush_plain(&mut tokens, &mut plain);
                tokens.push(Token::Mention(word.to_string()));
                i += 1 + word.len();
                continue;
            }
        }
        if rest.starts_with("http://") || rest.starts_with("https://") {
            let end = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            flush_plain(&mut tokens, &mut plain);
            tokens.push(Token::Link(rest[..end].to_string()));
            i += end;
            continue;
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        plain.push(ch);
        i += ch.len_utf8();
    }

    flush_plain(&mut tokens, &mut plain);
    tokens
}

fn flush_plain(tokens: &mut Vec<Token>, plain: &mut String) {
    if !plain.is_empty() {
        tokens.push(Token::Plain(std::mem::take(plain)));
    }
}

fn match_emoticon(rest: &str) -> Option<(&'static str, usize)> {
    EMOTICONS
        .iter()
        .find(|(pattern, _)| rest.starts_with(pattern))
        .map(|(pattern, glyph)| (*glyph, pattern.len()))
}

fn take_word(rest: &str) -> Option<&str> {
    let end = rest
        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Render tokens into a styled line for the comment panel.
pub fn render_line(text: &str) -> Line<'static> {
    let spans = tokenize(text)
        .into_iter()
        .map(|token| match token {
            Token::Plain(text) => Span::raw(text),
            Token::Hashtag(tag) => Span::styled(
                format!("#{tag}"),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Token::Mention(name) => Span::styled(
                format!("@{name}"),
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ),
            Token::Link(url) => Span::styled(
                url,
                Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            Token::Emoji(glyph) => Span::raw(glyph),
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(
            tokenize("just words"),
            vec![Token::Plain("just words".into())]
        );
    }

    #[test]
    fn hashtags_and_mentions_become_tokens() {
        assert_eq!(
            tokenize("hi #art by @maker"),
            vec![
                Token::Plain("hi ".into()),
                Token::Hashtag("art".into()),
                Token::Plain(" by ".into()),
                Token::Mention("maker".into()),
            ]
        );
    }

    #[test]
    fn urls_become_links() {
        assert_eq!(
            tokenize("see https://example.com/v/1 now"),
            vec![
                Token::Plain("see ".into()),
                Token::Link("https://example.com/v/1".into()),
                Token::Plain(" now".into()),
            ]
        );
    }

    #[test]
    fn emoticons_substitute_once() {
        assert_eq!(
            tokenize("nice :) really"),
            vec![
                Token::Plain("nice ".into()),
                Token::Emoji("😊"),
                Token::Plain(" really".into()),
            ]
        );
    }

    // A mention inside an already-produced token must not be re-scanned;
    // the single pass makes overlap impossible.
    #[test]
    fn single_pass_never_rescans_output() {
        let tokens = tokenize("#tag@user");
        assert_eq!(
            tokens,
            vec![Token::Hashtag("tag".into()), Token::Mention("user".into())]
        );
    }

    #[test]
    fn bare_sigils_stay_plain() {
        assert_eq!(
            tokenize("# and @ alone"),
            vec![Token::Plain("# and @ alone".into())]
        );
    }

    #[test]
    fn unicode_plain_text_survives() {
        assert_eq!(
            tokenize("café #tag"),
            vec![Token::Plain("café ".into()), Token::Hashtag("tag".into())]
        );
    }
}
