//! Query Parser
//!
//! Builds a [`QueryNode`] tree from the token stream with a recursive descent
//! over three precedence levels, loosest first:
//!
//! ```text
//! or    := and ( OR and )*
//! and   := unary ( AND unary )*
//! unary := NOT unary | "(" ")" | "(" or [")"] | leaf
//! leaf  := TEXT | ID | UNLABELED | <date | <=date | >date | >=date
//! ```
//!
//! Both binary operators are left associative. A group left open at the end
//! of the query is closed implicitly, and stray `)` after a complete
//! expression are ignored.
//!
//! # Examples
//!
//! ```text
//! a b             AND(a, b)
//! a,b c           OR(a, AND(b, c))
//! !a & (c | d)    AND(NOT(a), OR(c, d))
//! ```

use crate::query::ast::QueryNode;
use crate::query::error::{QueryError, QueryResult};
use crate::query::token::{tokenize, Token, TokenKind};

/// Groups may not nest deeper than this
pub const MAX_DEPTH: usize = 128;

/// Parse a query string into a query tree
pub fn parse_query(query: &str) -> QueryResult<QueryNode> {
    QueryParser::new(query)?.parse()
}

/// Parser over the tokens of one query
pub struct QueryParser<'a> {
    query: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> QueryParser<'a> {
    /// Tokenize `query` and prepare to parse it
    pub fn new(query: &'a str) -> QueryResult<Self> {
        Ok(Self {
            query,
            tokens: tokenize(query)?,
            pos: 0,
            depth: 0,
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Parse the whole query; an empty query parses to [`QueryNode::Empty`]
    pub fn parse(mut self) -> QueryResult<QueryNode> {
        if self.tokens.is_empty() {
            return Ok(QueryNode::Empty);
        }

        let node = self.parse_or()?;
        while self.eat(TokenKind::GroupEnd) {}

        match self.peek() {
            None => Ok(node),
            Some(token) => Err(self.error_at(token, format!("Unexpected token: {}", token))),
        }
    }

    fn parse_or(&mut self) -> QueryResult<QueryNode> {
        let mut node = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_and()?;
            node = QueryNode::or(node, right);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> QueryResult<QueryNode> {
        let mut node = self.parse_unary()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_unary()?;
            node = QueryNode::and(node, right);
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> QueryResult<QueryNode> {
        let Some(token) = self.advance() else {
            return Err(QueryError::parse(
                self.query,
                self.query.chars().count(),
                "Unexpected end of query",
            ));
        };

        match token.kind {
            TokenKind::Not => {
                let child = self.nested(&token, Self::parse_unary)?;
                Ok(QueryNode::not(child))
            }
            TokenKind::GroupStart => {
                if self.eat(TokenKind::GroupEnd) {
                    return Ok(QueryNode::Empty);
                }
                let node = self.nested(&token, Self::parse_or)?;
                self.eat(TokenKind::GroupEnd);
                Ok(node)
            }
            TokenKind::And | TokenKind::Or => {
                Err(self.error_at(&token, format!("Unexpected operator: {}", token)))
            }
            TokenKind::GroupEnd => Err(self.error_at(&token, "Unexpected end of group")),
            TokenKind::Text => Ok(QueryNode::Label(token.text)),
            TokenKind::Id => u32::try_from(token.value)
                .map(QueryNode::Id)
                .map_err(|_| self.error_at(&token, format!("Id out of range: {}", token.text))),
            TokenKind::Unlabeled => Ok(QueryNode::Unlabeled),
            TokenKind::DateLt => Ok(QueryNode::DateLt(token.value)),
            TokenKind::DateLte => Ok(QueryNode::DateLte(token.value)),
            TokenKind::DateGt => Ok(QueryNode::DateGt(token.value)),
            TokenKind::DateGte => Ok(QueryNode::DateGte(token.value)),
        }
    }

    fn nested(
        &mut self,
        token: &Token,
        parse: fn(&mut Self) -> QueryResult<QueryNode>,
    ) -> QueryResult<QueryNode> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error_at(token, "Query nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().map(|t| t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> QueryError {
        QueryError::parse(self.query, token.position, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(query: &str) -> String {
        parse_query(query).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parsed("a b"), "AND(a, b)");
        assert_eq!(parsed("a,b"), "OR(a, b)");
        assert_eq!(parsed("a,b c"), "OR(a, AND(b, c))");
        assert_eq!(parsed("a & b"), "AND(a, b)");
        assert_eq!(parsed("a & b | c"), "OR(AND(a, b), c)");
        assert_eq!(parsed("a | b & c"), "OR(a, AND(b, c))");
        assert_eq!(parsed("(a | b) & c"), "AND(OR(a, b), c)");
        assert_eq!(parsed("a & b | c & d | e"), "OR(OR(AND(a, b), AND(c, d)), e)");
    }

    #[test]
    fn test_negation() {
        assert_eq!(parsed("!a & (c & d | e)"), "AND(NOT(a), OR(AND(c, d), e))");
        assert_eq!(parsed("!(a | c & d) & e"), "AND(NOT(OR(a, AND(c, d))), e)");
        assert_eq!(parsed("a | !b & !c"), "OR(a, AND(NOT(b), NOT(c)))");
        assert_eq!(parsed("!!a"), "NOT(a)");
        assert_eq!(parsed("NOT NOT a"), "NOT(NOT(a))");
    }

    #[test]
    fn test_unbalanced_groups() {
        assert_eq!(parsed("!a | c & d)"), "OR(NOT(a), AND(c, d))");
        assert_eq!(parsed("(a | b"), "OR(a, b)");
        assert_eq!(parsed("((a)"), "a");
    }

    #[test]
    fn test_dates_and_ids() {
        assert_eq!(parsed("a & >=2019"), "AND(a, >=20190101000000000)");
        assert_eq!(
            parsed("a 2016..2018"),
            "AND(a, AND(>=20160101000000000, <=20181231235959999))"
        );
        assert_eq!(
            parsed("2016 & @12345"),
            "AND(AND(>=20160101000000000, <=20161231235959999), ID=12345)"
        );
        assert_eq!(parsed("@nolabel <2019"), "AND(UNLABELED, <20190101000000000)");
    }

    #[test]
    fn test_empty_queries() {
        assert_eq!(parse_query("").unwrap(), QueryNode::Empty);
        assert_eq!(parse_query("   ").unwrap(), QueryNode::Empty);
        assert_eq!(parse_query("()").unwrap(), QueryNode::Empty);
        assert_eq!(parsed("a ()"), "AND(a, EMPTY)");
    }

    #[test]
    fn test_errors() {
        let err = parse_query("a & & b").unwrap_err();
        assert_eq!(err.message(), "Unexpected operator: AND");
        assert_eq!(err.position(), 4);

        let err = parse_query("a | ! | b").unwrap_err();
        assert_eq!(err.message(), "Unexpected operator: OR");

        let err = parse_query("a &").unwrap_err();
        assert_eq!(err.message(), "Unexpected end of query");
        assert_eq!(err.position(), 3);

        assert!(parse_query(")").is_err());
        assert!(parse_query("| a").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}a", "(".repeat(MAX_DEPTH + 1));
        let err = parse_query(&deep).unwrap_err();
        assert_eq!(err.message(), "Query nested too deeply");

        let ok = format!("{}a", "(".repeat(MAX_DEPTH - 1));
        assert_eq!(parsed(&ok), "a");
    }

    #[test]
    fn test_long_flat_query() {
        let query = vec!["a"; 50_000].join(" ");
        let node = parse_query(&query).unwrap();
        assert_eq!(node.operands().len(), 50_000);
        assert!(parsed(&query).starts_with("AND(AND("));
    }

    #[test]
    fn test_tokens_are_kept() {
        let parser = QueryParser::new("a b").unwrap();
        assert_eq!(parser.tokens().len(), 3);
    }
}
