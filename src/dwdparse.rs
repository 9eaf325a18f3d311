// #DW directive parsing
//
// A directive is a single line: `#DW <command> key=value key=value ...`.
// Tokens are whitespace separated, so values cannot contain spaces.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const DIRECTIVE_PREFIX: &str = "#DW";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("missing '#DW' prefix in directive")]
    MissingPrefix,
    #[error("missing command in directive")]
    MissingCommand,
    #[error("repeated argument in directive: {0}")]
    RepeatedArgument(String),
    #[error("malformed argument in directive: '{0}'")]
    MalformedArgument(String),
}

/// Flat key/value view of one directive line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectiveArgs(BTreeMap<String, String>);

impl DirectiveArgs {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The tag following `#DW`
    pub fn command(&self) -> &str {
        self.get("command").unwrap_or_default()
    }

    pub fn action(&self) -> Option<&str> {
        self.get("action")
    }

    pub fn message(&self) -> &str {
        self.get("message").unwrap_or_default()
    }

    pub fn severity(&self) -> Option<&str> {
        self.get("severity")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Build the argument map for a directive.
///
/// The command is stored under `command`. Arguments split at the first `=`,
/// a bare key maps to `"true"`, and a key may only appear once.
pub fn build_args_map(directive: &str) -> Result<DirectiveArgs, DirectiveError> {
    let mut tokens = directive.split_whitespace();

    if tokens.next() != Some(DIRECTIVE_PREFIX) {
        return Err(DirectiveError::MissingPrefix);
    }

    let command = tokens.next().ok_or(DirectiveError::MissingCommand)?;

    let mut args = BTreeMap::new();
    args.insert("command".to_string(), command.to_string());

    for token in tokens {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, value),
            None => (token, "true"),
        };

        if key.is_empty() {
            return Err(DirectiveError::MalformedArgument(token.to_string()));
        }

        if args.contains_key(key) {
            return Err(DirectiveError::RepeatedArgument(key.to_string()));
        }

        args.insert(key.to_string(), value.to_string());
    }

    Ok(DirectiveArgs(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parses_complete_directive() {
        let args = build_args_map("#DW Proposal action=complete").unwrap();
        assert_eq!(args.command(), "Proposal");
        assert_eq!(args.action(), Some("complete"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parses_error_directive() {
        let args =
            build_args_map("#DW Proposal action=error message=Test_error_message severity=major")
                .unwrap();
        assert_eq!(args.action(), Some("error"));
        assert_eq!(args.message(), "Test_error_message");
        assert_eq!(args.severity(), Some("major"));
    }

    #[test]
    fn test_extra_whitespace_is_ignored() {
        let args = build_args_map("  #DW   DataIn\taction=wait  ").unwrap();
        assert_eq!(args.command(), "DataIn");
        assert_eq!(args.action(), Some("wait"));
    }

    #[test]
    fn test_value_keeps_everything_after_first_equals() {
        let args = build_args_map("#DW Setup action=error message=a=b").unwrap();
        assert_eq!(args.message(), "a=b");
    }

    #[test]
    fn test_bare_key_is_true() {
        let args = build_args_map("#DW Setup action=complete verbose").unwrap();
        assert_eq!(args.get("verbose"), Some("true"));
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(
            build_args_map("Proposal action=complete"),
            Err(DirectiveError::MissingPrefix)
        );
        assert_eq!(build_args_map(""), Err(DirectiveError::MissingPrefix));
        assert_eq!(
            build_args_map("#dw Proposal action=complete"),
            Err(DirectiveError::MissingPrefix)
        );
    }

    #[test]
    fn test_missing_command() {
        assert_eq!(build_args_map("#DW"), Err(DirectiveError::MissingCommand));
    }

    #[test]
    fn test_repeated_argument() {
        assert_eq!(
            build_args_map("#DW Proposal action=complete action=wait"),
            Err(DirectiveError::RepeatedArgument("action".to_string()))
        );
        // `command` is reserved for the tag
        assert_eq!(
            build_args_map("#DW Proposal command=other"),
            Err(DirectiveError::RepeatedArgument("command".to_string()))
        );
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(
            build_args_map("#DW Proposal =complete"),
            Err(DirectiveError::MalformedArgument("=complete".to_string()))
        );
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let args = build_args_map("#DW Proposal action=wait").unwrap();
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"action":"wait","command":"Proposal"}"#);
    }

    proptest! {
        #[test]
        fn prop_never_panics(line in ".*") {
            let _ = build_args_map(&line);
        }

        #[test]
        fn prop_distinct_keys_are_preserved(
            command in "[A-Za-z]{1,12}",
            pairs in proptest::collection::btree_map("[a-z]{1,8}", "[A-Za-z0-9_]{0,12}", 0..6),
        ) {
            prop_assume!(!pairs.contains_key("command"));

            let mut line = format!("#DW {command}");
            for (k, v) in &pairs {
                line.push_str(&format!(" {k}={v}"));
            }

            let args = build_args_map(&line).unwrap();
            prop_assert_eq!(args.command(), command.as_str());
            prop_assert_eq!(args.len(), pairs.len() + 1);
            for (k, v) in &pairs {
                prop_assert_eq!(args.get(k), Some(v.as_str()));
            }
        }
    }
}
