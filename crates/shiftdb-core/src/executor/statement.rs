//! Query script statements understood by [`SledTarget`](super::SledTarget).
//!
//! ```text
//! -- comment until end of line
//! PUT <collection> <key> <json>;
//! DELETE <collection> <key>;
//! DROP <collection>;
//! ```
//!
//! Commands are case-insensitive. Collection names and keys are bare tokens
//! ending at whitespace or `;`. The JSON value may span several lines.

use serde_json::Value;

use crate::error::ExecutionError;

/// A parsed query statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Insert or replace a document.
    Put {
        collection: String,
        key: String,
        document: Value,
    },
    /// Remove a document if present.
    Delete { collection: String, key: String },
    /// Remove every document of a collection.
    Drop { collection: String },
}

impl Statement {
    /// Collection the statement writes to.
    pub fn collection(&self) -> &str {
        match self {
            Statement::Put { collection, .. }
            | Statement::Delete { collection, .. }
            | Statement::Drop { collection } => collection,
        }
    }
}

/// Parse every statement of a script.
///
/// The whole script is parsed before anything is returned, so a malformed
/// statement anywhere in the script rejects all of it.
pub fn parse_script(src: &str) -> Result<Vec<Statement>, ExecutionError> {
    let mut parser = Parser { src, pos: 0 };
    let mut statements = Vec::new();

    loop {
        parser.skip_trivia();
        if parser.at_end() {
            break;
        }
        statements.push(parser.statement()?);
    }

    Ok(statements)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn line(&self) -> usize {
        self.src[..self.pos].matches('\n').count() + 1
    }

    fn error(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::InvalidStatement {
            line: self.line(),
            message: message.into(),
        }
    }

    /// Skip whitespace and `--` comments.
    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.src.len() - trimmed.len();
            if trimmed.starts_with("--") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    fn token(&mut self, what: &str) -> Result<&'a str, ExecutionError> {
        self.skip_trivia();
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(format!("expected {what}")));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn document(&mut self) -> Result<Value, ExecutionError> {
        self.skip_trivia();
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                self.pos += stream.byte_offset();
                Ok(value)
            }
            Some(Err(e)) => Err(self.error(format!("invalid JSON document: {e}"))),
            None => Err(self.error("expected JSON document")),
        }
    }

    fn terminator(&mut self) -> Result<(), ExecutionError> {
        self.skip_trivia();
        if self.rest().starts_with(';') {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error("expected ';'"))
        }
    }

    fn statement(&mut self) -> Result<Statement, ExecutionError> {
        let start = self.pos;
        let command = self.token("command")?;

        let statement = match command.to_ascii_uppercase().as_str() {
            "PUT" => {
                let collection = self.token("collection")?.to_string();
                let key = self.token("key")?.to_string();
                let document = self.document()?;
                Statement::Put {
                    collection,
                    key,
                    document,
                }
            }
            "DELETE" => Statement::Delete {
                collection: self.token("collection")?.to_string(),
                key: self.token("key")?.to_string(),
            },
            "DROP" => Statement::Drop {
                collection: self.token("collection")?.to_string(),
            },
            other => {
                self.pos = start;
                return Err(self.error(format!("unknown command '{other}'")));
            }
        };

        self.terminator()?;
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_statements() {
        let script = r#"
            -- seed the admin user
            PUT users admin {"name": "Administrator", "birth": "01/09/1998"};
            delete users ghost;
            DROP sessions;
        "#;

        let statements = parse_script(script).unwrap();
        assert_eq!(
            statements,
            vec![
                Statement::Put {
                    collection: "users".to_string(),
                    key: "admin".to_string(),
                    document: json!({"name": "Administrator", "birth": "01/09/1998"}),
                },
                Statement::Delete {
                    collection: "users".to_string(),
                    key: "ghost".to_string(),
                },
                Statement::Drop {
                    collection: "sessions".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_semicolon_inside_json_string() {
        let statements = parse_script(r#"PUT notes n1 {"text": "a; b"};"#).unwrap();
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Statement::Put { document, .. } => assert_eq!(document["text"], "a; b"),
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_multiline_document() {
        let script = "PUT users u1 {\n  \"name\": \"toto\"\n}\n;";
        assert_eq!(parse_script(script).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_script("  -- nothing here\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_command_reports_line() {
        let err = parse_script("DROP a;\n\nSELEKT * FROM users;").unwrap_err();
        match err {
            ExecutionError::InvalidStatement { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("SELEKT"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_terminator() {
        assert!(parse_script("DROP users").is_err());
        assert!(parse_script("PUT users u1 {\"a\": 1}").is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(parse_script("PUT users u1 {name: toto};").is_err());
        assert!(parse_script("PUT users u1 ;").is_err());
    }
}
