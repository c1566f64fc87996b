//! Query compiler for filtered-deck gathering.
//!
//! Supports the structural subset the scheduler itself relies on:
//! `deck:`, `is:`, `tag:` and `prop:` terms, negation with `-`,
//! parentheses, and `and`/`or` combinators (juxtaposition means and).
//! Compiles to a SQL predicate over `cards c JOIN notes n`.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SearchError {
    #[error("unbalanced parentheses in search")]
    UnbalancedParens,

    #[error("unsupported search term: {0}")]
    UnsupportedTerm(String),

    #[error("malformed property comparison: {0}")]
    BadProperty(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Collection state a search is resolved against.
pub(crate) struct SearchContext {
    /// `(id, lowercased name)` for every deck.
    pub deck_names: Vec<(i64, String)>,
    /// Ids of filtered decks, for `deck:filtered`.
    pub dynamic_dids: Vec<i64>,
    /// Selected deck and descendants, for `deck:current`.
    pub current_dids: Vec<i64>,
    pub today: i32,
    /// `now + collapse_time`; sub-day learning counts as due below it.
    pub learn_cutoff: i64,
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Or,
    And,
    Neg,
    Term(String),
}

fn tokenize(query: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Neg);
            }
            _ => {
                let mut word = String::new();
                let mut in_quotes = false;
                while let Some(&c) = chars.peek() {
                    if c == '"' {
                        in_quotes = !in_quotes;
                        chars.next();
                        continue;
                    }
                    if !in_quotes && (c.is_whitespace() || c == '(' || c == ')') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                if in_quotes {
                    return Err(SearchError::UnbalancedParens);
                }
                if word.eq_ignore_ascii_case("or") {
                    tokens.push(Token::Or);
                } else if word.eq_ignore_ascii_case("and") {
                    tokens.push(Token::And);
                } else {
                    tokens.push(Token::Term(word));
                }
            }
        }
    }
    Ok(tokens)
}

/// Compile a search string to a SQL predicate, or fail on terms this
/// engine cannot express.
pub(crate) fn compile_search(query: &str, ctx: &SearchContext) -> Result<String> {
    let tokens = tokenize(query)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        ctx,
    };
    let sql = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(SearchError::UnbalancedParens);
    }
    Ok(sql)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a SearchContext,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_expr(&mut self) -> Result<String> {
        let mut parts = vec![self.parse_and_group()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            parts.push(self.parse_and_group()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap_or_default())
        } else {
            Ok(format!("({})", parts.join(" OR ")))
        }
    }

    fn parse_and_group(&mut self) -> Result<String> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                }
                Some(Token::Neg) | Some(Token::Open) | Some(Token::Term(_)) => {
                    parts.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        match parts.len() {
            // an empty group matches everything
            0 => Ok("1".to_string()),
            1 => Ok(parts.pop().unwrap_or_default()),
            _ => Ok(format!("({})", parts.join(" AND "))),
        }
    }

    fn parse_unary(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Neg) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(format!("NOT {}", inner))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                if !matches!(self.peek(), Some(Token::Close)) {
                    return Err(SearchError::UnbalancedParens);
                }
                self.pos += 1;
                Ok(format!("({})", inner))
            }
            Some(Token::Term(_)) => {
                let term = match self.tokens.get(self.pos) {
                    Some(Token::Term(t)) => t.clone(),
                    _ => String::new(),
                };
                self.pos += 1;
                self.compile_term(&term)
            }
            _ => Err(SearchError::UnbalancedParens),
        }
    }

    fn compile_term(&self, term: &str) -> Result<String> {
        let (key, value) = term
            .split_once(':')
            .ok_or_else(|| SearchError::UnsupportedTerm(term.to_string()))?;
        match key.to_ascii_lowercase().as_str() {
            "deck" => Ok(self.deck_predicate(value)),
            "is" => self.state_predicate(value),
            "tag" => Ok(tag_predicate(value)),
            "prop" => property_predicate(value, self.ctx.today),
            _ => Err(SearchError::UnsupportedTerm(term.to_string())),
        }
    }

    fn deck_predicate(&self, value: &str) -> String {
        let dids: Vec<i64> = match value.to_ascii_lowercase().as_str() {
            "filtered" => self.ctx.dynamic_dids.clone(),
            "current" => self.ctx.current_dids.clone(),
            name => self
                .ctx
                .deck_names
                .iter()
                .filter(|(_, deck_name)| {
                    deck_name.as_str() == name
                        || (deck_name.len() > name.len() + 1
                            && deck_name.starts_with(name)
                            && deck_name.as_bytes()[name.len()] == b'.')
                })
                .map(|(id, _)| *id)
                .collect(),
        };
        if dids.is_empty() {
            "0".to_string()
        } else {
            format!("c.did IN {}", crate::storage::store::ids_to_sql(&dids))
        }
    }

    fn state_predicate(&self, value: &str) -> Result<String> {
        let sql = match value.to_ascii_lowercase().as_str() {
            "new" => "c.queue = 0".to_string(),
            "learn" => "c.queue IN (1, 3, 4)".to_string(),
            "review" => "c.type = 2".to_string(),
            "suspended" => "c.queue = -1".to_string(),
            "buried" => "c.queue IN (-2, -3)".to_string(),
            "due" => format!(
                "((c.queue IN (2, 3) AND c.due <= {}) OR (c.queue = 1 AND c.due < {}))",
                self.ctx.today, self.ctx.learn_cutoff
            ),
            other => return Err(SearchError::UnsupportedTerm(format!("is:{}", other))),
        };
        Ok(sql)
    }
}

fn tag_predicate(tag: &str) -> String {
    let escaped = tag.replace('\'', "''").replace('*', "%");
    format!("n.tags LIKE '% {} %'", escaped)
}

fn property_predicate(value: &str, today: i32) -> Result<String> {
    let ops = ["<=", ">=", "!=", "=", "<", ">"];
    let (name, op, num) = ops
        .iter()
        .copied()
        .find_map(|op| value.split_once(op).map(|(name, num)| (name, op, num)))
        .ok_or_else(|| SearchError::BadProperty(value.to_string()))?;
    let num: i64 = num
        .parse()
        .map_err(|_| SearchError::BadProperty(value.to_string()))?;
    let sql = match name {
        "ivl" => format!("c.ivl {} {}", op, num),
        "reps" => format!("c.reps {} {}", op, num),
        "lapses" => format!("c.lapses {} {}", op, num),
        // days from today, review cards only
        "due" => format!("(c.queue IN (2, 3) AND c.due - {} {} {})", today, op, num),
        _ => return Err(SearchError::BadProperty(value.to_string())),
    };
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SearchContext {
        SearchContext {
            deck_names: vec![
                (1, "default".to_string()),
                (2, "language".to_string()),
                (3, "language.verbs".to_string()),
            ],
            dynamic_dids: vec![9],
            current_dids: vec![2, 3],
            today: 100,
            learn_cutoff: 5_000,
        }
    }

    #[test]
    fn test_deck_matches_subtree() {
        let sql = compile_search("deck:language", &ctx()).unwrap();
        assert_eq!(sql, "c.did IN (2,3)");
    }

    #[test]
    fn test_unknown_deck_matches_nothing() {
        assert_eq!(compile_search("deck:nope", &ctx()).unwrap(), "0");
    }

    #[test]
    fn test_gather_wrapper_shape() {
        let sql =
            compile_search("(deck:language) -is:suspended -is:buried -deck:filtered", &ctx())
                .unwrap();
        assert!(sql.contains("c.did IN (2,3)"));
        assert!(sql.contains("NOT c.queue = -1"));
        assert!(sql.contains("NOT c.queue IN (-2, -3)"));
        assert!(sql.contains("NOT c.did IN (9)"));
    }

    #[test]
    fn test_or_groups() {
        let sql = compile_search("is:new or is:review", &ctx()).unwrap();
        assert_eq!(sql, "(c.queue = 0 OR c.type = 2)");
    }

    #[test]
    fn test_prop_comparison() {
        let sql = compile_search("prop:ivl>=21", &ctx()).unwrap();
        assert_eq!(sql, "c.ivl >= 21");
    }

    #[test]
    fn test_bare_word_rejected() {
        assert!(matches!(
            compile_search("giraffe", &ctx()),
            Err(SearchError::UnsupportedTerm(_))
        ));
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert_eq!(compile_search("", &ctx()).unwrap(), "1");
    }
}
