//! Query error types
//!
//! A malformed query is reported with the query text and the character
//! position of the problem, rendered with a caret under the offending spot.

use thiserror::Error;

/// Errors that can occur while tokenizing or parsing a query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Query text could not be parsed
    #[error("{}", render_parse_error(.query, .position, .message))]
    Parse {
        query: String,
        /// Character (not byte) offset of the problem
        position: usize,
        message: String,
    },
}

impl QueryError {
    pub fn parse(query: &str, position: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            query: query.to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn position(&self) -> usize {
        match self {
            QueryError::Parse { position, .. } => *position,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QueryError::Parse { message, .. } => message,
        }
    }
}

fn render_parse_error(query: &str, position: &usize, message: &str) -> String {
    let position = *position;
    let shown = query.replace('\n', "\\n");
    // Each escaped newline before the caret takes one extra column
    let extra = query.chars().take(position).filter(|&c| c == '\n').count();
    format!(
        "Error in query: {}\nQuery: {}\n       {}^",
        message,
        shown,
        " ".repeat(position + extra)
    )
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
