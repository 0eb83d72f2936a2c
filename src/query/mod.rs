//! LabelDB Query Engine
//!
//! A small boolean/date language over labels:
//!
//! - **Token**: Lexing, implicit AND, date range expansion
//! - **AST**: Query tree types
//! - **Parser**: Precedence parsing into the tree
//! - **Evaluator**: Bitmap evaluation against index state
//!
//! # Query Language
//!
//! ```text
//! a b  a & b  a AND b       both labels
//! a,b  a | b  a OR b        either label
//! !a   NOT a                without the label
//! (a, b) c                  grouping
//! <2019  <=2019.6  >2019.6.5-12:30  >=20190605
//! 2019  2016..2018          whole year / closed range
//! @12                       record id 12
//! @unlabeled  @nolabel      records without labels
//! "a b"  'a b'  `a b`       quoted label
//! ```
//!
//! AND binds tighter than OR. Dates may leave out trailing components; the
//! missing ones are filled in to the start or end of the named period.
//!
//! # Example
//!
//! ```rust
//! use labeldb::query::parse_query;
//!
//! let query = parse_query("a,b c").unwrap();
//! assert_eq!(query.to_string(), "OR(a, AND(b, c))");
//! ```

mod ast;
mod error;
mod evaluator;
mod parser;
mod token;

pub use ast::QueryNode;
pub use error::{QueryError, QueryResult};
pub use evaluator::{MatchResults, QueryEvaluator};
pub use parser::{parse_query, QueryParser, MAX_DEPTH};
pub use token::{resolve_date, tokenize, Rounding, Token, TokenKind, Tokenizer};
