use smol_str::SmolStr;

use super::ast::{
    AggregateExpression, Aggregator, Clause, CompareOp, Direction, EdgePattern, Filter, Hop, LimitExpression,
    Predicate, QueryExpression, ReturnType, SortExpression, SortKey, VertexPattern,
};
use super::token::{Token, TokenKind};
use crate::error::syntax::{SyntaxError, SyntaxErrorKind};
use crate::grammar::{DEFAULT_MAX_ERRORS, ErrorReporter};
use crate::value::Value;

type ParseResult<T> = Result<T, SyntaxError>;

/// Error-recovering parser for BQL. On a syntax error it skips to the next
/// aggregator or clause keyword and leaves an error node behind.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    errors: ErrorReporter,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self::with_max_errors(tokens, DEFAULT_MAX_ERRORS)
    }

    pub fn with_max_errors(tokens: &'a [Token], max_errors: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: ErrorReporter::new(max_errors),
        }
    }

    pub fn parse(mut self) -> (QueryExpression, ErrorReporter) {
        let aggregate = self.parse_aggregate();

        let sort = matches!(self.current().kind, TokenKind::Order).then(|| {
            let result = self.parse_sort();
            self.clause(result)
        });
        let limit = matches!(self.current().kind, TokenKind::Limit).then(|| {
            let result = self.parse_limit();
            self.clause(result)
        });
        let project = matches!(self.current().kind, TokenKind::Returns).then(|| {
            let result = self.parse_project();
            self.clause(result)
        });

        let trailing = if self.current().is_eof() {
            None
        } else {
            Some(self.error(SyntaxErrorKind::UnexpectedToken))
        };

        (
            QueryExpression {
                aggregate,
                sort,
                limit,
                project,
                trailing,
            },
            self.errors,
        )
    }

    fn parse_aggregate(&mut self) -> AggregateExpression {
        let first = self.parse_predicate();
        let mut rest = Vec::new();

        while let Some(aggregator) = aggregator(&self.current().kind) {
            self.advance();
            rest.push((aggregator, self.parse_predicate()));
        }

        AggregateExpression { first, rest }
    }

    fn parse_predicate(&mut self) -> Clause<Predicate> {
        let result = self.parse_chain();
        self.clause(result)
    }

    fn parse_chain(&mut self) -> ParseResult<Predicate> {
        let start_range = self.current().range;
        let start = self.parse_vertex()?;
        let mut hops = Vec::new();

        while matches!(self.current().kind, TokenKind::Minus | TokenKind::LeftArrow) {
            let edge = self.parse_edge()?;
            let vertex = self.parse_vertex()?;
            hops.push(Hop { edge, vertex });
        }

        Ok(Predicate {
            start,
            hops,
            range: start_range.merge(&self.previous().range),
        })
    }

    fn parse_vertex(&mut self) -> ParseResult<VertexPattern> {
        let model = match &self.current().kind {
            TokenKind::Ident(name) => Some(name.clone()),
            TokenKind::Star => None,
            _ => return Err(self.unexpected()),
        };
        self.advance();

        let mut filters = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                filters.push(self.parse_filter()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, SyntaxErrorKind::ExpectedClosingParen)?;
        }

        Ok(VertexPattern { model, filters })
    }

    fn parse_filter(&mut self) -> ParseResult<Filter> {
        let field = self.expect_ident()?;

        let op = match &self.current().kind {
            TokenKind::Equal => CompareOp::Eq,
            TokenKind::NeEq => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            _ => return Err(self.error(SyntaxErrorKind::Expected("a comparison operator".into()))),
        };
        self.advance();

        let negative = self.eat(&TokenKind::Minus);
        let value = match &self.current().kind {
            TokenKind::NumberLiteral(n) if negative => Value::Number(-*n),
            TokenKind::NumberLiteral(n) => Value::Number(*n),
            TokenKind::StringLiteral(s) if !negative => Value::String(s.clone()),
            TokenKind::True if !negative => Value::TRUE,
            TokenKind::False if !negative => Value::FALSE,
            TokenKind::Null if !negative => Value::NONE,
            TokenKind::UnterminatedString(_) => return Err(self.error(SyntaxErrorKind::UnterminatedString)),
            _ => return Err(self.unexpected()),
        };
        self.advance();

        Ok(Filter { field, op, value })
    }

    fn parse_edge(&mut self) -> ParseResult<EdgePattern> {
        let incoming = self.eat(&TokenKind::LeftArrow);
        if !incoming {
            self.advance();
        }

        self.expect(&TokenKind::LBracket, SyntaxErrorKind::Expected("`[`".into()))?;
        let label = match &self.current().kind {
            TokenKind::Ident(label) => {
                let label = label.clone();
                self.advance();
                Some(label)
            }
            _ => None,
        };
        self.expect(&TokenKind::RBracket, SyntaxErrorKind::ExpectedClosingBracket)?;

        let direction = match (incoming, &self.current().kind) {
            (true, TokenKind::Minus) => Direction::Incoming,
            (false, TokenKind::Arrow) => Direction::Outgoing,
            (false, TokenKind::Minus) => Direction::Both,
            (true, _) => return Err(self.error(SyntaxErrorKind::Expected("`-`".into()))),
            (false, _) => return Err(self.error(SyntaxErrorKind::Expected("`->` or `-`".into()))),
        };
        self.advance();

        Ok(EdgePattern { label, direction })
    }

    fn parse_sort(&mut self) -> ParseResult<SortExpression> {
        self.advance();
        self.expect(&TokenKind::By, SyntaxErrorKind::Expected("BY".into()))?;

        let mut keys = Vec::new();
        loop {
            let mut path = vec![self.expect_ident()?];
            while self.eat(&TokenKind::Dot) {
                path.push(self.expect_ident()?);
            }

            let descending = if self.eat(&TokenKind::Desc) {
                true
            } else {
                self.eat(&TokenKind::Asc);
                false
            };
            keys.push(SortKey { path, descending });

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(SortExpression { keys })
    }

    fn parse_limit(&mut self) -> ParseResult<LimitExpression> {
        self.advance();
        let first = self.expect_count()?;

        if self.eat(&TokenKind::Comma) {
            let count = self.expect_count()?;
            Ok(LimitExpression { offset: first, count })
        } else {
            Ok(LimitExpression {
                offset: 0,
                count: first,
            })
        }
    }

    fn parse_project(&mut self) -> ParseResult<ReturnType> {
        self.advance();

        let return_type = match &self.current().kind {
            TokenKind::Nodes => ReturnType::Nodes,
            TokenKind::Paths => ReturnType::Paths,
            _ => return Err(self.error(SyntaxErrorKind::Expected("NODES or PATHS".into()))),
        };
        self.advance();

        Ok(return_type)
    }

    fn expect_ident(&mut self) -> ParseResult<SmolStr> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(SyntaxErrorKind::Expected("an identifier".into()))),
        }
    }

    fn expect_count(&mut self) -> ParseResult<usize> {
        match &self.current().kind {
            TokenKind::NumberLiteral(n) => match n.to_count() {
                Some(count) => {
                    self.advance();
                    Ok(count)
                }
                None => Err(self.error(SyntaxErrorKind::InvalidNumber)),
            },
            _ => Err(self.unexpected()),
        }
    }

    /// Turns a failed clause into an error node, reporting it and skipping to a synchronization point.
    fn clause<T>(&mut self, result: ParseResult<T>) -> Clause<T> {
        match result {
            Ok(node) => Clause::Parsed(node),
            Err(error) => {
                self.synchronize();
                Clause::Error(error)
            }
        }
    }

    fn synchronize(&mut self) {
        while !matches!(
            self.current().kind,
            TokenKind::Union
                | TokenKind::Intersect
                | TokenKind::Exclude
                | TokenKind::Order
                | TokenKind::Limit
                | TokenKind::Returns
                | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    fn current(&self) -> &'a Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn previous(&self) -> &'a Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len().saturating_sub(1))]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, missing: SyntaxErrorKind) -> ParseResult<()> {
        if self.eat(kind) { Ok(()) } else { Err(self.error(missing)) }
    }

    fn error(&mut self, kind: SyntaxErrorKind) -> SyntaxError {
        let token = self.current();
        let kind = match (&token.kind, kind) {
            (TokenKind::Eof, SyntaxErrorKind::UnexpectedToken) => SyntaxErrorKind::UnexpectedEof,
            (TokenKind::Unknown(_), SyntaxErrorKind::UnexpectedToken) => SyntaxErrorKind::UnknownCharacter,
            (TokenKind::UnterminatedString(_), SyntaxErrorKind::UnexpectedToken) => {
                SyntaxErrorKind::UnterminatedString
            }
            (_, kind) => kind,
        };

        let error = SyntaxError::new(kind, token.range, token.text());
        self.errors.report(error.clone());
        error
    }

    fn unexpected(&mut self) -> SyntaxError {
        self.error(SyntaxErrorKind::UnexpectedToken)
    }
}

fn aggregator(kind: &TokenKind) -> Option<Aggregator> {
    match kind {
        TokenKind::Union => Some(Aggregator::Union),
        TokenKind::Intersect => Some(Aggregator::Intersect),
        TokenKind::Exclude => Some(Aggregator::Exclude),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::CollectErrors;
    use crate::query::lexer::tokenize;
    use rstest::rstest;

    fn parse(query: &str) -> QueryExpression {
        let tokens = tokenize(query);
        Parser::new(&tokens).parse().0
    }

    #[test]
    fn test_parse_chain() {
        let query = parse("Person(age > 30, name != \"Bob\")-[knows]->*<-[]-Company");
        let predicate = query.aggregate.first.parsed().cloned();
        let Some(predicate) = predicate else {
            panic!("expected a predicate");
        };

        assert_eq!(predicate.start.model.as_deref(), Some("Person"));
        assert_eq!(predicate.start.filters.len(), 2);
        assert_eq!(predicate.start.filters[0].op, CompareOp::Gt);
        assert_eq!(predicate.hops.len(), 2);
        assert_eq!(predicate.hops[0].edge.label.as_deref(), Some("knows"));
        assert_eq!(predicate.hops[0].edge.direction, Direction::Outgoing);
        assert_eq!(predicate.hops[0].vertex.model, None);
        assert_eq!(predicate.hops[1].edge.direction, Direction::Incoming);
        assert_eq!(predicate.to_string(), "Person(age > 30, name != \"Bob\")-[knows]->*<-[]-Company");
    }

    #[rstest]
    #[case("A LIMIT 10", LimitExpression { offset: 0, count: 10 })]
    #[case("A LIMIT 20, 5", LimitExpression { offset: 20, count: 5 })]
    #[case("A LIMIT 9007199254740991", LimitExpression { offset: 0, count: 9_007_199_254_740_991 })]
    fn test_parse_limit(#[case] query: &str, #[case] expected: LimitExpression) {
        let query = parse(query);
        assert_eq!(query.limit.as_ref().and_then(Clause::parsed), Some(&expected));
    }

    #[test]
    fn test_parse_all_clauses() {
        let query = parse("A UNION B EXCLUDE C ORDER BY address.city DESC, name LIMIT 3 RETURNS PATHS");
        assert!(query.errors().is_empty());
        assert_eq!(
            query.aggregate.rest.iter().map(|(aggregator, _)| *aggregator).collect::<Vec<_>>(),
            vec![Aggregator::Union, Aggregator::Exclude]
        );
        let sort = query.sort.as_ref().and_then(Clause::parsed).cloned();
        assert_eq!(sort.map(|sort| sort.to_string()).as_deref(), Some("address.city DESC, name ASC"));
        assert_eq!(query.project.as_ref().and_then(Clause::parsed), Some(&ReturnType::Paths));
    }

    #[rstest]
    #[case("", SyntaxErrorKind::UnexpectedEof)]
    #[case("A UNION", SyntaxErrorKind::UnexpectedEof)]
    #[case("A(age >)", SyntaxErrorKind::UnexpectedToken)]
    #[case("A(age > 1", SyntaxErrorKind::ExpectedClosingParen)]
    #[case("A-[knows]B", SyntaxErrorKind::Expected("`->` or `-`".into()))]
    #[case("A LIMIT 1.5", SyntaxErrorKind::InvalidNumber)]
    #[case("A LIMIT 18446744073709551617", SyntaxErrorKind::InvalidNumber)]
    #[case("A LIMIT 9007199254740993", SyntaxErrorKind::InvalidNumber)]
    #[case("A LIMIT 9007199254740993, 1", SyntaxErrorKind::InvalidNumber)]
    #[case("A LIMIT", SyntaxErrorKind::UnexpectedEof)]
    #[case("A RETURNS EDGES", SyntaxErrorKind::Expected("NODES or PATHS".into()))]
    #[case("A B", SyntaxErrorKind::UnexpectedToken)]
    #[case("A ; B", SyntaxErrorKind::UnknownCharacter)]
    #[case("A(name = \"x)", SyntaxErrorKind::UnterminatedString)]
    fn test_parse_errors(#[case] query: &str, #[case] kind: SyntaxErrorKind) {
        let errors = parse(query).errors();
        assert!(!errors.is_empty(), "{query}");
        assert_eq!(errors[0].kind, kind);
    }

    #[test]
    fn test_recovers_after_bad_predicate() {
        let query = parse("A( UNION B INTERSECT C");
        assert!(matches!(query.aggregate.first, Clause::Error(_)));
        assert_eq!(query.aggregate.rest.len(), 2);
        assert!(query.aggregate.rest.iter().all(|(_, predicate)| predicate.parsed().is_some()));
    }
}
