use std::cmp::Ordering;

/// A run of either ASCII digits or non-digit characters.
#[derive(Debug, Clone, Copy)]
enum Token<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;
        let numeric = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != numeric)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if numeric {
            Token::Digits(head)
        } else {
            Token::Text(head)
        })
    }
}

fn tokens(s: &str) -> Tokens<'_> {
    Tokens { rest: s }
}

/// Compare two digit runs by numeric value without parsing (runs may exceed u64).
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text(a: &str, b: &str, ignore_case: bool) -> Ordering {
    if ignore_case {
        a.chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase))
    } else {
        a.cmp(b)
    }
}

/// Natural ordering: embedded digit runs compare by numeric value, so
/// `track2` sorts before `track10`. Digit runs sort before text runs.
pub fn compare(a: &str, b: &str, ignore_case: bool) -> Ordering {
    let mut left = tokens(a);
    let mut right = tokens(b);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Token::Digits(x)), Some(Token::Digits(y))) => compare_digits(x, y),
            (Some(Token::Text(x)), Some(Token::Text(y))) => compare_text(x, y, ignore_case),
            (Some(Token::Digits(_)), Some(Token::Text(_))) => Ordering::Less,
            (Some(Token::Text(_)), Some(Token::Digits(_))) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Order slash-separated paths segment by segment, each segment naturally.
/// A path with fewer segments sorts before its extensions; remaining ties are
/// broken byte-wise so the result is a total order.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/');
    let mut right = b.split('/');
    let structural = loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => break Ordering::Equal,
            (None, Some(_)) => break Ordering::Less,
            (Some(_), None) => break Ordering::Greater,
            (Some(x), Some(y)) => compare(x, y, false),
        };
        if ord != Ordering::Equal {
            break ord;
        }
    };
    structural.then_with(|| a.cmp(b))
}
