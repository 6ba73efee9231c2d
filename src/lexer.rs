/// Characters that end a token. Whitespace plus the punctuation the index
/// treats as word boundaries. Terms are routed to segments by hashing, so
/// changing this set invalidates every existing index.
fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '.' | ','
                | ';'
                | ':'
                | '?'
                | '!'
                | '"'
                | '\''
                | '-'
                | '_'
                | '/'
                | '('
                | ')'
                | '['
                | ']'
                | '<'
                | '>'
                | '%'
                | '$'
                | '€'
        )
}

/// A simple lexer that splits already lowercased text into index terms.
/// Duplicates and their order are kept because the position of a token in
/// the output is the position stored in the postings.
pub struct Lexer<'a> {
    input: &'a [char],
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [char]) -> Self {
        Self { input }
    }

    /// Drops separator characters from the front of the input.
    fn trim_left(&mut self) {
        while !self.input.is_empty() && is_separator(self.input[0]) {
            self.input = &self.input[1..];
        }
    }

    /// Chops `n` characters from the beginning of the input and returns them
    /// as a slice.
    fn chop(&mut self, n: usize) -> &'a [char] {
        let token = &self.input[0..n];
        self.input = &self.input[n..];
        token
    }

    /// Chops characters from the input while a given predicate remains true.
    fn chop_while<P>(&mut self, mut predicate: P) -> &'a [char]
    where
        P: FnMut(&char) -> bool,
    {
        let mut n = 0;
        while n < self.input.len() && predicate(&self.input[n]) {
            n += 1;
        }

        self.chop(n)
    }

    fn next_token(&mut self) -> Option<String> {
        self.trim_left();

        if self.input.is_empty() {
            return None;
        }

        Some(self.chop_while(|c| !is_separator(*c)).iter().collect())
    }
}

impl Iterator for Lexer<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Lowercases `text` and splits it into terms. Tokens produced by adjacent
/// separators are discarded, everything else is kept as-is.
pub fn tokenize(text: &str) -> Vec<String> {
    let chars = text.to_lowercase().chars().collect::<Vec<char>>();
    Lexer::new(&chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace_and_punctuation() {
        assert_eq!(
            tokenize("hello, world! how are-you"),
            vec!["hello", "world", "how", "are", "you"]
        );
    }

    #[test]
    fn lowercases_input() {
        assert_eq!(tokenize("Hello WORLD"), vec!["hello", "world"]);
    }

    #[test]
    fn discards_empty_tokens() {
        assert_eq!(tokenize("a,,b...c  d"), vec!["a", "b", "c", "d"]);
        assert_eq!(tokenize("...!!!"), Vec::<String>::new());
        assert_eq!(tokenize(""), Vec::<String>::new());
    }

    #[test]
    fn keeps_duplicates_in_order() {
        assert_eq!(
            tokenize("to be or not to be"),
            vec!["to", "be", "or", "not", "to", "be"]
        );
    }

    #[test]
    fn currency_and_bracket_characters_are_separators() {
        assert_eq!(
            tokenize("price$100%off<now>[deal]€5"),
            vec!["price", "100", "off", "now", "deal", "5"]
        );
    }

    #[test]
    fn keeps_unclassified_symbols_inside_tokens() {
        assert_eq!(tokenize("rust2024 += c&a"), vec!["rust2024", "+=", "c&a"]);
    }
}
