#[cfg(test)]
mod scanner_tests {
    use rox::error::LoxError;
    use rox::scanner::*;
    use rox::token::*;

    fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
        let scanner = Scanner::new(source.as_bytes());
        let tokens: Vec<_> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), expected.len());

        for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
            assert_eq!(actual.lexeme, *expected_lexeme);
        }
    }

    fn assert_token_matches(
        result: &Result<Token, LoxError>,
        expected_type: TokenType,
        expected_lexeme: &str,
    ) {
        match result {
            Ok(token) => {
                assert_eq!(
                    token.token_type, expected_type,
                    "Expected token type {:?}, got {:?}",
                    expected_type, token.token_type
                );
                assert_eq!(
                    token.lexeme, expected_lexeme,
                    "Expected lexeme '{}', got '{}'",
                    expected_lexeme, token.lexeme
                );
            }
            Err(e) => panic!("Expected token but got error: {}", e),
        }
    }

    #[test]
    fn test_scanner_01_symbols() {
        assert_token_sequence(
            "({*.,+*})",
            &[
                (TokenType::LEFT_PAREN, "("),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::STAR, "*"),
                (TokenType::DOT, "."),
                (TokenType::COMMA, ","),
                (TokenType::PLUS, "+"),
                (TokenType::STAR, "*"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_02_operators_maximal_munch() {
        assert_token_sequence(
            "! != = == < <= > >= ? :",
            &[
                (TokenType::BANG, "!"),
                (TokenType::BANG_EQUAL, "!="),
                (TokenType::EQUAL, "="),
                (TokenType::EQUAL_EQUAL, "=="),
                (TokenType::LESS, "<"),
                (TokenType::LESS_EQUAL, "<="),
                (TokenType::GREATER, ">"),
                (TokenType::GREATER_EQUAL, ">="),
                (TokenType::QUESTION, "?"),
                (TokenType::COLON, ":"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_03_keywords_and_identifiers() {
        assert_token_sequence(
            "class breaker break fun _x1 orchid or",
            &[
                (TokenType::CLASS, "class"),
                (TokenType::IDENTIFIER, "breaker"),
                (TokenType::BREAK, "break"),
                (TokenType::FUN, "fun"),
                (TokenType::IDENTIFIER, "_x1"),
                (TokenType::IDENTIFIER, "orchid"),
                (TokenType::OR, "or"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_04_numbers_leave_trailing_dot() {
        let tokens: Vec<Token> = Scanner::new(b"12.5 7.")
            .filter_map(Result::ok)
            .collect();

        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].literal(), Some(rox::expr::LiteralValue::Number(12.5)));
        assert_eq!(tokens[1].literal(), Some(rox::expr::LiteralValue::Number(7.0)));
        assert_eq!(tokens[1].lexeme, "7");
        assert_eq!(tokens[2].token_type, TokenType::DOT);
    }

    #[test]
    fn test_scanner_05_display_format() {
        let tokens: Vec<String> = Scanner::new(br#"42 3.14 "hi" x"#)
            .filter_map(Result::ok)
            .map(|t| t.to_string())
            .collect();

        assert_eq!(
            tokens,
            vec![
                "NUMBER 42 42.0",
                "NUMBER 3.14 3.14",
                "STRING \"hi\" hi",
                "IDENTIFIER x null",
                "EOF  null",
            ]
        );
    }

    #[test]
    fn test_scanner_06_comments_are_skipped_and_lines_counted() {
        let source = "a // line comment\n/* block\ncomment */ b\n/* * / ** */ c";
        let tokens: Vec<Token> = Scanner::new(source.as_bytes())
            .filter_map(Result::ok)
            .collect();

        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["a", "b", "c", ""]);

        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 3);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn test_scanner_07_multiline_string() {
        let tokens: Vec<Token> = Scanner::new(b"\"one\ntwo\" after")
            .filter_map(Result::ok)
            .collect();

        assert_eq!(
            tokens[0].token_type,
            TokenType::STRING(String::new()),
            "variant comparison ignores payload"
        );
        assert_eq!(
            tokens[0].literal(),
            Some(rox::expr::LiteralValue::Str("one\ntwo".to_string()))
        );
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_scanner_08_unterminated_string() {
        let (tokens, errors) = scan_tokens(b"print \"oops");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "[line 1] Error: Unterminated string.");

        // no STRING token, only `print` and EOF
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].token_type, TokenType::EOF);
    }

    #[test]
    fn test_unexpected_chars_token_sequence() {
        let source = ",.$(#";
        let scanner = Scanner::new(source.as_bytes());

        // Collect all results (both tokens and errors)
        let results: Vec<_> = scanner.collect();

        // 0: COMMA ','
        // 1: DOT '.'
        // 2: Error for '$'
        // 3: LEFT_PAREN '('
        // 4: Error for '#'
        // 5: EOF
        assert_eq!(results.len(), 6, "Expected 6 items in result");

        assert_token_matches(&results[0], TokenType::COMMA, ",");
        assert_token_matches(&results[1], TokenType::DOT, ".");
        assert_token_matches(&results[3], TokenType::LEFT_PAREN, "(");
        assert_token_matches(&results[5], TokenType::EOF, "");

        let error_count = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(error_count, 2, "Expected 2 error messages");

        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                err.to_string().contains("Unexpected character"),
                "Error message should contain 'Unexpected character', got: {}",
                err
            );
        }
    }

    #[test]
    fn test_scanner_09_single_eof_then_fused() {
        let mut scanner = Scanner::new(b"");

        assert!(matches!(
            scanner.next(),
            Some(Ok(Token { token_type: TokenType::EOF, .. }))
        ));
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }
}
